use anyhow::{anyhow, bail, Context};
use sifter_core::{FilterField, RowKey};
use sifter_engine::ContextId;

pub const HELP: &str = "\
commands:
  set <field> <value>    update a filter field (empty value clears thresholds)
  query                  run a quick query
  job                    start a backend job (replaces a running one)
  cancel                 cancel the running job
  select <ticker> <date> select a result row
  open                   open another context on the same origin
  use <id>               switch the active context
  close                  close the active context
  show                   print the active context's state
  help                   print this help
  quit                   close every context and exit";

/// One line of console input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set(FilterField),
    Query,
    Job,
    Cancel,
    Select(RowKey),
    Open,
    Use(ContextId),
    Close,
    Show,
    Help,
    Quit,
}

/// Parses a console line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> anyhow::Result<Option<Command>> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb {
        "" => return Ok(None),
        "set" => {
            let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if key.is_empty() {
                bail!("usage: set <field> <value> (fields: {})", FilterField::KEYS.join(", "));
            }
            Command::Set(FilterField::parse(key, value)?)
        }
        "query" => Command::Query,
        "job" => Command::Job,
        "cancel" => Command::Cancel,
        "select" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(ticker), Some(date), None) => {
                    Command::Select(RowKey::new(ticker.to_ascii_uppercase(), date))
                }
                _ => bail!("usage: select <ticker> <date>"),
            }
        }
        "open" => Command::Open,
        "use" => Command::Use(
            rest.parse()
                .with_context(|| format!("invalid context id {rest:?}"))?,
        ),
        "close" => Command::Close,
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(anyhow!("unknown command {other:?}, try `help`")),
    };
    Ok(Some(command))
}
