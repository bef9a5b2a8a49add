use crate::error::{FieldEngineError, Result};
use crate::histogram::*;
use crate::structs::*;
use crate::uint::*;
use rand_core::*;
use rand_pcg::Pcg32;
use serde::Deserialize;

fn default_step() -> u64 {
    1
}

/// Description of one engine in the configuration file
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum EngineConfig {
    #[serde(rename = "uint")]
    UInt {
        name: String,
        size: u16,
        offset: u16,
        #[serde(default)]
        op: Operation,
        #[serde(default = "default_step")]
        step: u64,
        #[serde(default)]
        min: u64,
        /// TOML integers are signed 64-bit,
        /// so the full u64 range is only reachable by omitting `max`
        max: Option<u64>,
        #[serde(default)]
        init: u64,
    },
    #[serde(rename = "histogram")]
    Histogram {
        name: String,
        size: u16,
        offset: u16,
        entries: Vec<HistogramEntry>,
    },
}

#[derive(Deserialize, Debug)]
struct ConfigFile {
    seed: Option<u64>,
    #[serde(default)]
    engines: Vec<EngineConfig>,
}

impl EngineConfig {
    fn name(&self) -> &str {
        match self {
            EngineConfig::UInt { name, .. } | EngineConfig::Histogram { name, .. } => name,
        }
    }

    fn build(self, rng: Pcg32) -> Result<Box<dyn FieldEngine>> {
        match self {
            EngineConfig::UInt {
                size,
                offset,
                op,
                step,
                min,
                max,
                init,
                ..
            } => {
                let max_value = match max {
                    Some(m) => m,
                    None => max_for_size(size).ok_or_else(|| {
                        FieldEngineError::InvalidConfig(format!(
                            "Invalid size {size}. Size should be one of {UINT_SIZES:?}"
                        ))
                    })?,
                };
                let par = UIntEngineParams {
                    size,
                    offset,
                    op,
                    step,
                    min_value: min,
                    max_value,
                    init_value: init,
                };
                Ok(Box::new(UIntEngine::new(par, rng)?))
            }
            EngineConfig::Histogram {
                size,
                offset,
                entries,
                ..
            } => {
                let par = HistogramEngineParams {
                    size,
                    offset,
                    entries,
                };
                Ok(Box::new(HistogramEngine::new(par, rng)?))
            }
        }
    }
}

/// An ordered list of named field engines that fill a packet.
///
/// The list does not decide when a packet is generated: the caller invokes `update`
/// once per packet.
#[derive(Debug, Default)]
pub struct FieldEngines {
    engines: Vec<(String, Box<dyn FieldEngine>)>,
}

impl FieldEngines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an engine at the end of the list. Names must be unique
    pub fn push(&mut self, name: &str, engine: Box<dyn FieldEngine>) -> Result<()> {
        if self.get(name).is_some() {
            return Err(FieldEngineError::InvalidConfig(format!(
                "Field engine {name} is defined twice"
            )));
        }
        self.engines.push((name.to_string(), engine));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn FieldEngine> {
        self.engines
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.as_ref())
    }

    /// Names of the engines, in the order they are applied
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.engines.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Write every field into `packet`, in order. Stops at the first failure;
    /// the fields written before the failure are kept.
    pub fn update(&mut self, packet: &mut [u8]) -> Result<()> {
        let len = packet.len();
        for (name, engine) in self.engines.iter_mut() {
            let offset = engine.offset() as usize;
            if offset > len {
                log::warn!("Field {name} is out of the packet");
                return Err(FieldEngineError::OffsetOutOfBounds { offset, len });
            }
            engine
                .update(&mut packet[offset..])
                .inspect_err(|e| log::warn!("Cannot update field {name}: {e}"))?;
        }
        Ok(())
    }
}

/// Parse a TOML document describing field engines and build them.
///
/// With a `seed`, each engine gets its own generator seeded from a master generator,
/// in declaration order, so the generated values are reproducible.
pub fn import_config(config: &str) -> Result<FieldEngines> {
    let file: ConfigFile = toml::from_str(config)?;
    let mut master_rng = match file.seed {
        Some(s) => Pcg32::seed_from_u64(s),
        None => Pcg32::from_os_rng(),
    };
    let mut engines = FieldEngines::new();
    for engine_config in file.engines {
        let name = engine_config.name().to_string();
        let rng = Pcg32::seed_from_u64(master_rng.next_u64());
        let engine = engine_config.build(rng).map_err(|e| match e {
            FieldEngineError::InvalidConfig(s) => {
                FieldEngineError::InvalidConfig(format!("{name}: {s}"))
            }
            e => e,
        })?;
        engines.push(&name, engine)?;
    }
    log::info!("{} field engines loaded", engines.len());
    Ok(engines)
}
