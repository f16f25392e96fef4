//! Known-exchange reference data loading
//!
//! Reads the exchange address list from a CSV file with an `Address` column
//! and optional `Label` / `Exchange Name` columns (Label preferred). The
//! rest of the tool only ever sees the resulting `ExchangeSet`.

use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::{Address, ExchangeSet};

/// Load and normalize the exchange set. Failure here is fatal to starting
/// an analysis session.
pub fn load_exchange_set<P: AsRef<Path>>(path: P) -> Result<ExchangeSet> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| Error::ExchangeList(format!("{}: {}", path.display(), e)))?;

    let mut lines = content.lines();
    let header = lines
        .next()
        .ok_or_else(|| Error::ExchangeList(format!("{} is empty", path.display())))?;

    let columns: Vec<String> = split_row(header)
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();

    let address_column = columns
        .iter()
        .position(|c| c == "Address" || c == "address")
        .ok_or_else(|| {
            Error::ExchangeList(format!("{} has no Address column", path.display()))
        })?;
    let label_column = columns.iter().position(|c| c == "Label");
    let name_column = columns.iter().position(|c| c == "Exchange Name");

    let mut set = ExchangeSet::default();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_row(line);

        let Some(raw_address) = fields.get(address_column) else {
            continue;
        };
        let address = Address::new(raw_address);
        if address.is_empty() {
            continue;
        }

        let label = label_column
            .and_then(|i| fields.get(i))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                name_column
                    .and_then(|i| fields.get(i))
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
            })
            .map(str::to_string);

        set.insert(address, label);
    }

    if set.is_empty() {
        return Err(Error::ExchangeList(format!(
            "{} contains no exchange addresses",
            path.display()
        )));
    }

    info!("Loaded {} exchange addresses from {}", set.len(), path.display());
    Ok(set)
}

/// Split one CSV row, honoring double-quoted fields
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
