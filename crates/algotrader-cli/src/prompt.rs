//! Terminal prompts for usernames and passwords.

use std::io::{self, BufRead, Write};

use anyhow::Result;

/// Read a password without echoing it.
pub fn password(label: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("{}: ", label))?;
    Ok(password)
}

/// Read a visible line from stdin, falling back to `default` when left blank.
pub fn line(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => print!("{} [{}]: ", label, default),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;
    read_line(io::stdin().lock(), default)
}

fn read_line(mut input: impl BufRead, default: Option<&str>) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    let line = line.trim();
    Ok(match (line.is_empty(), default) {
        (true, Some(default)) => default.to_string(),
        _ => line.to_string(),
    })
}
