use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::cli::{DeleteArgs, GenerateArgs, GetArgs, GlobalArgs, SetArgs};
use crate::context::{CliError, CliResult, open_engine};
use crate::output::render_value;

pub(crate) fn handle_get(global: &GlobalArgs, args: &GetArgs) -> CliResult<()> {
    let engine = open_engine(global)?;
    let value = engine.get(&args.name)?;
    println!("{}", render_value(&args.name, &value, global.output)?);
    Ok(())
}

pub(crate) fn handle_set(global: &GlobalArgs, args: &SetArgs) -> CliResult<()> {
    let text = match (&args.value, &args.from_file) {
        (Some(value), None) => value.clone(),
        (None, Some(path)) => read_value_file(path)?,
        _ => {
            return Err(CliError::usage("pass either a value or --from-file"));
        }
    };
    let engine = open_engine(global)?;
    engine.set_text(&args.name, &text, args.safe)?;
    Ok(())
}

pub(crate) fn handle_delete(global: &GlobalArgs, args: &DeleteArgs) -> CliResult<()> {
    let engine = open_engine(global)?;
    if !engine.delete(&args.name)? {
        eprintln!("{} was not set", args.name);
    }
    Ok(())
}

pub(crate) fn handle_generate(global: &GlobalArgs, args: &GenerateArgs) -> CliResult<()> {
    if args.length == 0 {
        return Err(CliError::usage("--length must be at least 1"));
    }
    let engine = open_engine(global)?;
    engine.generate(&args.name, args.length, args.safe)?;
    Ok(())
}

fn read_value_file(path: &Path) -> CliResult<String> {
    let mut text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))
        .map_err(CliError::failure)?;
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    Ok(text)
}
