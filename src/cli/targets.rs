//! Targets command.

use clap::Args;
use mcharm::{BuildTarget, Builder, Result};
use serde::Serialize;

use super::ConfigArgs;

/// List build targets and whether each can be built offline.
#[derive(Args, Debug)]
pub struct TargetsCmd {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl TargetsCmd {
    pub fn run(self) -> Result<()> {
        print_targets(&Builder::new(self.config.load()?), self.json)
    }
}

#[derive(Debug, Serialize)]
struct TargetRow {
    name: String,
    host: bool,
    stub: String,
    image: String,
    stub_available: bool,
    image_available: bool,
}

fn rows(builder: &Builder) -> Vec<TargetRow> {
    BuildTarget::ALL
        .iter()
        .map(|t| TargetRow {
            name: t.name(),
            host: t.is_host(),
            stub: t.stub_id(),
            image: t.image_id(),
            stub_available: builder.stubs().is_available(t),
            image_available: builder.runtime().is_available(t),
        })
        .collect()
}

/// Print the target table for `builder`'s sources.
pub fn print_targets(builder: &Builder, json: bool) -> Result<()> {
    let rows = rows(builder);

    if json {
        match serde_json::to_string_pretty(&rows) {
            Ok(text) => println!("{}", text),
            Err(e) => tracing::warn!(error = %e, "target list serialization failed"),
        }
        return Ok(());
    }

    println!("{:<16} {:<8} {:<8} STUB FILE", "TARGET", "STUB", "RUNTIME");
    for row in rows {
        let name = if row.host {
            format!("{} *", row.name)
        } else {
            row.name
        };
        println!(
            "{:<16} {:<8} {:<8} {}",
            name,
            availability(row.stub_available),
            availability(row.image_available),
            row.stub
        );
    }
    println!();
    println!("* host target. Unavailable runtimes are downloaded on first build.");
    Ok(())
}

fn availability(available: bool) -> &'static str {
    if available {
        "ready"
    } else {
        "missing"
    }
}
