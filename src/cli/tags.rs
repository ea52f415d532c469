// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Tags command - print the tags derived for a trigger

use miette::Result;
use std::path::Path;

use super::{load_settings, TriggerArgs};
use crate::tags::TagResolver;

/// Run the tags command
pub async fn run(config_path: &Path, trigger: TriggerArgs, primary: bool, verbose: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let ctx = trigger.resolve()?;
    let resolver = TagResolver::new(&settings.tags);

    if primary {
        let tag = resolver
            .primary(&ctx)
            .ok_or_else(|| miette::miette!("No primary tag could be derived for {}", ctx))?;
        println!("{}", tag);
        return Ok(());
    }

    let tags = resolver.resolve(&ctx);
    let image = settings.image_name();
    for tag in tags.iter() {
        if verbose {
            println!("{}\t{}\t{}:{}", tag.scheme, tag.value, image, tag.value);
        } else {
            println!("{}", tag.value);
        }
    }

    Ok(())
}
