use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};

fn label(question: &str) -> &str {
    question.trim_end_matches([':', ' '])
}

/// Ask on stderr and read one trimmed line from stdin. EOF is an error so an
/// unattended run fails instead of hanging.
fn read_answer(question: &str) -> Result<String> {
    let mut err = io::stderr();
    write!(err, "{question}")?;
    err.flush()?;
    let mut line = String::new();
    let n = io::stdin().lock().read_line(&mut line).context("read stdin")?;
    if n == 0 {
        bail!("no answer given for: {}", label(question));
    }
    Ok(line.trim().to_string())
}

/// Like [`read_answer`], but an empty answer is also an error.
pub fn ask(question: &str) -> Result<String> {
    let answer = read_answer(question)?;
    if answer.is_empty() {
        bail!("no answer given for: {}", label(question));
    }
    Ok(answer)
}

/// An empty answer is allowed.
pub fn ask_optional(question: &str) -> Result<String> {
    read_answer(question)
}

pub fn value_or_ask(value: Option<String>, question: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => ask(question),
    }
}
