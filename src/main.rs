//! shellstream: run one stream operation described as JSON.
//!
//! Reads a request from stdin, writes the result as JSON to stdout:
//!
//! ```text
//! {"op": "find", "root": "~/src", "pattern": ".rs", "limit": 20}
//! {"op": "stream", "command": "sort", "input": ["b", "a"]}
//! {"op": "system", "command": "make test"}
//! ```
//!
//! Line-producing operations answer `{"lines": [...]}`; `system` answers
//! `{"status": <code or null>}` after the child's own output. Failures
//! answer `{"error": "..."}` and exit with status 1.

use std::io::Read;
use std::path::PathBuf;

use serde::Deserialize;
use shellstream::config::Config;
use shellstream::prelude::*;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(flatten)]
    request: Request,
    /// Stop after this many lines.
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Request {
    Ls {
        path: String,
    },
    Lstree {
        path: String,
    },
    Find {
        root: String,
        pattern: String,
    },
    Grep {
        pattern: String,
        #[serde(default)]
        input: Vec<String>,
    },
    Sed {
        pattern: String,
        replacement: String,
        #[serde(default)]
        input: Vec<String>,
    },
    Cat {
        paths: Vec<String>,
    },
    System {
        command: String,
        #[serde(default)]
        input: Vec<String>,
    },
    Stream {
        command: String,
        #[serde(default)]
        input: Vec<String>,
    },
}

/// Expand `~` and `$VARS` the way a shell would before touching the path.
fn expand(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(path),
    }
}

fn display_paths(paths: Stream<PathBuf>) -> Stream<String> {
    paths.map(|p| p.display().to_string())
}

fn run(envelope: Envelope) -> Result<serde_json::Value> {
    let lines = match envelope.request {
        Request::System { command, input } => {
            let status = system(&command, select(input))?;
            return Ok(serde_json::json!({ "status": status.code() }));
        }
        Request::Ls { path } => display_paths(ls(expand(&path))),
        Request::Lstree { path } => display_paths(lstree(expand(&path))),
        Request::Find { root, pattern } => display_paths(find(Literal::new(pattern), expand(&root))),
        Request::Grep { pattern, input } => grep(Literal::new(pattern), select(input)),
        Request::Sed {
            pattern,
            replacement,
            input,
        } => sed(Literal::new(pattern).replace_with(replacement), select(input)),
        Request::Cat { paths } => cat(paths
            .iter()
            .map(|p| shellstream::prelude::input(expand(p)))
            .collect()),
        Request::Stream { command, input } => stream(&command, select(input)),
    };
    let lines = match envelope.limit {
        Some(n) => limit(n, lines),
        None => lines,
    };
    Ok(serde_json::json!({ "lines": lines.to_vec()? }))
}

fn fail(message: impl std::fmt::Display) -> ! {
    let output = serde_json::json!({ "error": message.to_string() });
    println!("{output}");
    std::process::exit(1);
}

fn main() {
    shellstream::logging::init(&Config::current().logging);

    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        fail(format!("failed to read stdin: {e}"));
    }

    let envelope: Envelope = match serde_json::from_str(&input) {
        Ok(v) => v,
        Err(e) => fail(format!("JSON parse error: {e}")),
    };
    log::debug!("request: {envelope:?}");

    match run(envelope) {
        Ok(output) => println!("{output}"),
        Err(e) => fail(e),
    }
}
