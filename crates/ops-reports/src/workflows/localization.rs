//! Appends a randomly named destination to a localization YAML document.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::PathBuf;
use tracing::info;

pub const DESTINATION_TYPES: [&str; 4] = ["table", "pickpoint", "charging_station", "route"];
pub const DEFAULT_NAME_LENGTH: usize = 5;
const DESTINATIONS_KEY: &str = "destinations";

#[derive(Debug, thiserror::Error)]
pub enum LocalizationError {
    #[error("unable to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse YAML: {0}")]
    Parse(#[source] serde_yaml::Error),
    #[error("document has no 'destinations' mapping")]
    MissingDestinations,
    #[error("no character pool selected for name generation")]
    EmptyAlphabet,
    #[error("unable to serialize YAML: {0}")]
    Serialize(#[source] serde_yaml::Error),
    #[error("unable to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Character pools a generated name may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameAlphabet {
    pub hangul: bool,
    pub kana: bool,
    pub digits: bool,
    pub punctuation: bool,
}

impl Default for NameAlphabet {
    fn default() -> Self {
        Self {
            hangul: true,
            kana: true,
            digits: true,
            punctuation: true,
        }
    }
}

impl NameAlphabet {
    pub fn pool(&self) -> Vec<char> {
        let mut pool = Vec::new();
        if self.hangul {
            pool.extend((0xAC00..0xD7A4).filter_map(char::from_u32));
        }
        if self.kana {
            pool.extend((0x3040..0x30A0).filter_map(char::from_u32));
        }
        if self.digits {
            pool.extend('0'..='9');
        }
        if self.punctuation {
            pool.extend((0x21u8..0x7F).map(char::from).filter(char::is_ascii_punctuation));
        }
        pool
    }
}

pub fn random_name<R: Rng + ?Sized>(
    rng: &mut R,
    length: usize,
    alphabet: NameAlphabet,
    prefix: &str,
) -> Result<String, LocalizationError> {
    let pool = alphabet.pool();
    if pool.is_empty() {
        return Err(LocalizationError::EmptyAlphabet);
    }
    let mut name = String::from(prefix);
    for _ in 0..length {
        name.push(pool[rng.gen_range(0..pool.len())]);
    }
    Ok(name)
}

pub fn random_type<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    DESTINATION_TYPES.choose(rng).copied().unwrap_or(DESTINATION_TYPES[0])
}

fn zeroed(axes: &[&str]) -> Value {
    let mut mapping = Mapping::new();
    for axis in axes {
        mapping.insert(Value::from(*axis), Value::from(0));
    }
    Value::Mapping(mapping)
}

pub fn destination_entry(name: &str, kind: &str) -> Value {
    let mut entry = Mapping::new();
    entry.insert(Value::from("name"), Value::from(name));
    entry.insert(Value::from("orientation"), zeroed(&["w", "x", "y", "z"]));
    entry.insert(Value::from("position"), zeroed(&["x", "y", "z"]));
    entry.insert(Value::from("type"), Value::from(kind));
    Value::Mapping(entry)
}

/// Inserts the entry under `destinations`, keyed by its name.
pub fn insert_destination(document: &mut Value, name: &str, kind: &str) -> Result<(), LocalizationError> {
    let destinations = document
        .get_mut(DESTINATIONS_KEY)
        .and_then(Value::as_mapping_mut)
        .ok_or(LocalizationError::MissingDestinations)?;
    destinations.insert(Value::from(name), destination_entry(name, kind));
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub length: usize,
    pub prefix: String,
    pub alphabet: NameAlphabet,
}

impl SeedOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            length: DEFAULT_NAME_LENGTH,
            prefix: String::new(),
            alphabet: NameAlphabet::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededDestination {
    pub name: String,
    pub kind: &'static str,
}

pub fn seed_destination<R: Rng + ?Sized>(
    options: &SeedOptions,
    rng: &mut R,
) -> Result<SeededDestination, LocalizationError> {
    let raw = fs::read_to_string(&options.input).map_err(|source| LocalizationError::Read {
        path: options.input.clone(),
        source,
    })?;
    let mut document: Value = serde_yaml::from_str(&raw).map_err(LocalizationError::Parse)?;

    let name = random_name(rng, options.length, options.alphabet, &options.prefix)?;
    let kind = random_type(rng);
    insert_destination(&mut document, &name, kind)?;

    let rendered = serde_yaml::to_string(&document).map_err(LocalizationError::Serialize)?;
    fs::write(&options.output, rendered).map_err(|source| LocalizationError::Write {
        path: options.output.clone(),
        source,
    })?;

    info!(name = %name, kind, output = %options.output.display(), "destination seeded");
    Ok(SeededDestination { name, kind })
}

pub fn run(options: &SeedOptions) -> Result<SeededDestination, LocalizationError> {
    seed_destination(options, &mut rand::thread_rng())
}
