// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Graph command - visualize the stage graph

use miette::Result;
use std::path::Path;

use super::{load_settings, GraphFormat};
use crate::pipeline::standard_graph;

/// Run the graph command
pub async fn run(config_path: &Path, format: GraphFormat, verbose: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let graph = standard_graph(&settings)?;

    let output = match format {
        GraphFormat::Text => graph.to_text(),
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    };

    print!("{}", output);

    if verbose && format == GraphFormat::Text {
        println!();
        for (depth, level) in graph.levels().iter().enumerate() {
            println!("level {}: {}", depth, level.join(", "));
        }
    }

    Ok(())
}
