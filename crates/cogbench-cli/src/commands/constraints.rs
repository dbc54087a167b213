//! The `cogbench constraints` command.

use std::path::PathBuf;

use anyhow::{anyhow, Result};

use cogbench_core::model::{CognitiveLevel, Mode};

use super::load_config_and_registry;

pub fn execute(level: Option<String>, mode: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let (_, registry) = load_config_and_registry(config_path.as_deref())?;

    let levels: Vec<CognitiveLevel> = match level {
        Some(l) => vec![l.parse().map_err(|e: String| anyhow!(e))?],
        None => CognitiveLevel::ALL.to_vec(),
    };
    let modes: Vec<Mode> = match mode {
        Some(m) => vec![m.parse().map_err(|e: String| anyhow!(e))?],
        None => vec![Mode::Standard, Mode::Adversarial],
    };

    for mode in &modes {
        for level in &levels {
            println!("{}", registry.describe(*level, *mode));
        }
    }
    Ok(())
}
