//! Machine images.
//!
//! An image is a JSON document holding a CPU configuration, the register
//! file and any number of memory blocks:
//!
//! ```json
//! {
//!   "options": { "model": "Hp1000E", "installed": ["Eau", "FloatingPoint", "ExtendedInstructionGroup"] },
//!   "registers": { "a": 0, "b": 0, "p": 64, "o": false },
//!   "memory": [ { "address": 64, "words": [33040, 34944, 256] } ]
//! }
//! ```
//!
//! `registers` and `memory` may be omitted. Options are validated on load.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{event, Level};

use crate::cpu::options::ConfigError;
use crate::cpu::{CpuOptions, Machine, Registers};
use crate::word::ADDRESS_SPACE;

/// A run of consecutive memory words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub address: u16,
    pub words: Vec<u16>,
}

/// A saved machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineImage {
    pub options: CpuOptions,
    #[serde(default)]
    pub registers: Registers,
    #[serde(default)]
    pub memory: Vec<MemoryBlock>,
}

impl MachineImage {
    /// Parse and validate an image.
    pub fn from_json(text: &str) -> Result<Self, ImageError> {
        let image: MachineImage = serde_json::from_str(text)?;
        image.validate()?;
        Ok(image)
    }

    pub fn to_json(&self) -> Result<String, ImageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let image = Self::from_json(&text)?;
        event!(
            Level::DEBUG,
            "loaded {} ({} model, {} memory blocks)",
            path.as_ref().display(),
            image.options.model(),
            image.memory.len()
        );
        Ok(image)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ImageError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ImageError> {
        self.options.validate()?;
        for block in &self.memory {
            if block.address as usize + block.words.len() > ADDRESS_SPACE {
                return Err(ImageError::BlockOverflow {
                    address: block.address,
                    len: block.words.len(),
                });
            }
        }
        Ok(())
    }

    /// Build the machine this image describes.
    pub fn to_machine(&self) -> Machine {
        let mut machine = Machine::new(self.options.clone());
        machine.regs = self.registers.clone();
        for block in &self.memory {
            machine.mem.load(block.address, &block.words);
        }
        machine
    }

    /// Capture a machine. Memory is saved as runs of non-zero words.
    pub fn capture(machine: &Machine) -> Self {
        let mut memory: Vec<MemoryBlock> = Vec::new();
        let mut open = false;
        for (address, word) in machine.mem.dump(0, ADDRESS_SPACE) {
            if word == 0 {
                open = false;
            } else if open {
                if let Some(block) = memory.last_mut() {
                    block.words.push(word);
                }
            } else {
                memory.push(MemoryBlock {
                    address,
                    words: vec![word],
                });
                open = true;
            }
        }
        Self {
            options: machine.options.clone(),
            registers: machine.regs.clone(),
            memory,
        }
    }
}

/// Errors that can occur reading or writing an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed image: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("memory block at {address:05o} with {len} words runs past the end of memory")]
    BlockOverflow { address: u16, len: usize },
}
