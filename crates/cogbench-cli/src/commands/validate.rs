//! The `cogbench validate` command.

use std::path::PathBuf;

use anyhow::Result;

use cogbench_core::constraints::ConstraintLibrary;
use cogbench_core::model::Mode;
use cogbench_core::parser;

use super::load_config_and_registry;

pub fn execute(
    passages: PathBuf,
    generations: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (config, registry) = load_config_and_registry(config_path.as_deref())?;
    ConstraintLibrary::new(&config.settings)?;
    println!("Registry {} valid.", registry.version());

    let store = parser::load_passages(&passages)?;
    let subjects = store.subjects();
    println!(
        "Passages: {} across {} subject(s) ({})",
        store.len(),
        subjects.len(),
        subjects.join(", ")
    );

    let mut total_warnings = 0;
    for passage in store.iter() {
        if passage.key_concepts.is_empty() {
            println!("  [{}] WARNING: no key concepts", passage.passage_id);
            total_warnings += 1;
        }
    }

    if let Some(path) = generations {
        let batch = parser::load_generations(&path)?;
        let adversarial = batch
            .questions
            .iter()
            .filter(|q| q.mode == Mode::Adversarial)
            .count();
        println!(
            "Generations: {} ({}), {} questions ({} adversarial)",
            batch.model,
            batch.mode,
            batch.questions.len(),
            adversarial
        );

        for skipped in &batch.malformed {
            println!("  [#{}] WARNING: {}", skipped.index, skipped.message);
        }
        total_warnings += batch.malformed.len();

        for question in &batch.questions {
            if let Err(e) = store.get(question) {
                println!("  [{}] WARNING: {e}", question.question_id);
                total_warnings += 1;
            }
        }
    }

    if total_warnings == 0 {
        println!("All inputs valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }
    Ok(())
}
