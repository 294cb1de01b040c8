//! Interactive edit command
//!
//! Opens (or creates) a pipeline draft and drives the editor shell until
//! EOF. `commit` validates the draft, stores the definition and provisions
//! the base environment right away; the shell stays open afterwards so the
//! operator can keep iterating.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;

use strata_core::draft::DraftPipeline;
use strata_engine::{EngineConfig, EventBus, PipelineRunner};
use strata_ledger::{PgPool, pipelines};

use crate::commands::run::report;
use crate::editor::{Editor, EditorOutcome, parse_command};

pub async fn edit_pipeline(config: EngineConfig, pool: PgPool, name: &str) -> Result<()> {
    let draft = match pipelines::load(&pool, name).await? {
        Some(existing) => {
            println!("Editing committed pipeline {}", name.cyan());
            DraftPipeline::from_pipeline(&existing)
        }
        None => {
            println!("Creating new pipeline {}", name.cyan());
            DraftPipeline::new(name)
        }
    };

    let events = EventBus::default();
    let runner = Arc::new(PipelineRunner::new(config, pool, events));
    let mut editor = Editor::new(draft);

    loop {
        let line = match prompt_read(&editor.prompt())? {
            Some(line) => line,
            None => return Ok(()),
        };
        if line.is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e.to_string().red());
                continue;
            }
        };

        match editor.apply(command) {
            Ok(EditorOutcome::Continue) => {}
            Ok(EditorOutcome::Committed(pipeline)) => {
                println!("Committing pipeline {}", pipeline.name.cyan());
                match runner.commit(pipeline).await {
                    Ok(summary) => {
                        if let Err(e) = report(&summary) {
                            println!("{}", e.to_string().red());
                        }
                    }
                    Err(e) => println!("{}", e.to_string().red()),
                }
            }
            Err(e) => println!("{}", e.to_string().red()),
        }
    }
}

/// Prints the prompt and reads one trimmed line; None on EOF.
fn prompt_read(prompt: &str) -> io::Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        println!();
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}
