use crate::error::{Error, Result};
use crate::plist::Plist;
use crate::stream::json_writer::{JsonPolicy, JsonWriter};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// One file to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    path: PathBuf,
}

impl Input {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Input { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl From<PathBuf> for Input {
    fn from(path: PathBuf) -> Self {
        Input::new(path)
    }
}

impl From<&str> for Input {
    fn from(path: &str) -> Self {
        Input::new(path)
    }
}

#[derive(Debug)]
pub struct Failure {
    pub input: Input,
    pub error: Error,
}

/// Outcome of [`convert_all`]: failures are listed in input order.
#[derive(Debug, Default)]
pub struct Report {
    pub converted: usize,
    pub failures: Vec<Failure>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// The handle is closed when this returns, whichever way it returns.
fn read_input(path: &Path) -> Result<Vec<u8>> {
    let open_error = |source| Error::Open {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(open_error)?;
    let mut data = vec![];
    file.read_to_end(&mut data).map_err(open_error)?;
    Ok(data)
}

pub fn convert_bytes(data: &[u8], policy: JsonPolicy) -> Result<String> {
    Plist::parse(data)?.to_json_string(policy)
}

pub fn convert_file(path: &Path, policy: JsonPolicy) -> Result<String> {
    let data = read_input(path)?;
    debug!(path = %path.display(), bytes = data.len(), "read plist");
    convert_bytes(&data, policy)
}

/// Converts every input in order and writes one JSON line per success.
///
/// A failed input is logged and recorded in the [`Report`], produces no line,
/// and does not stop the remaining inputs. Only a failure to write `output`
/// ends the run early.
pub fn convert_all<W: Write>(
    inputs: &[Input],
    policy: JsonPolicy,
    output: &mut W,
) -> Result<Report> {
    let mut report = Report::default();
    for input in inputs {
        match convert_file(input.path(), policy) {
            Ok(json) => {
                writeln!(output, "{}", json)?;
                report.converted += 1;
            }
            Err(err) => {
                error!("{}: {}", input.path().display(), err);
                report.failures.push(Failure {
                    input: input.clone(),
                    error: err,
                });
            }
        }
    }
    output.flush()?;
    Ok(report)
}
