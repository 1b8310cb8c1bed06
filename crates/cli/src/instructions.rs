//! Reading the batch instruction file.
//!
//! Rows are headerless `exchange,ticker,action,order_type,quantity,price,session`.
//! Lines starting with `#` and blank lines are skipped.

use anyhow::{anyhow, bail, Context, Result};
use batch_trade_core::{
    Action, Exchange, OrderKind, Quantity, Session, TradeInstruction,
};
use rust_decimal::Decimal;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Reads and validates every instruction in `path`.
///
/// # Errors
/// Returns an error if the file cannot be read or any row is invalid.
pub fn read_instructions(path: &Path) -> Result<Vec<TradeInstruction>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open instruction file {}", path.display()))?;
    let instructions = parse_instructions(file)?;
    tracing::info!(count = instructions.len(), path = %path.display(), "read trade instructions");
    Ok(instructions)
}

/// Parses instructions from CSV text.
///
/// # Errors
/// Returns the first invalid row, with its 1-based line number.
pub fn parse_instructions(mut reader: impl Read) -> Result<Vec<TradeInstruction>> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .context("failed to read instructions")?;

    let mut instructions = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(trimmed.as_bytes());
        let Some(record) = csv.records().next() else {
            continue;
        };
        let record = record.with_context(|| format!("malformed CSV row at line {line}"))?;
        let fields: Vec<&str> = record.iter().collect();
        instructions.push(parse_row(&fields, line)?);
    }
    Ok(instructions)
}

fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

fn parse_row(fields: &[&str], line: usize) -> Result<TradeInstruction> {
    let at_line = |e: batch_trade_core::ParseFieldError| anyhow!("{e} at line {line}");

    let exchange = Exchange::from_str(field(fields, 0)).map_err(at_line)?;
    let ticker = field(fields, 1).to_uppercase();
    if ticker.is_empty() {
        bail!("Ticker missing at line {line}");
    }
    let action = Action::from_str(field(fields, 2)).map_err(at_line)?;
    let order_kind = OrderKind::from_str(field(fields, 3)).map_err(at_line)?;
    let mut session = Session::from_str(field(fields, 6)).map_err(at_line)?;

    // Unparseable prices count as missing.
    let price = Decimal::from_str(field(fields, 5)).ok();
    if order_kind == OrderKind::Limit && price.is_none() {
        bail!("Price missing for limit order at line {line}");
    }

    if order_kind == OrderKind::Last && session == Session::Normal {
        session = Session::Extended;
    }

    let quantity = parse_quantity(field(fields, 4), action, order_kind, line)?;

    Ok(TradeInstruction {
        line,
        exchange,
        ticker,
        action,
        order_kind,
        quantity,
        price,
        session,
    })
}

fn parse_quantity(raw: &str, action: Action, kind: OrderKind, line: usize) -> Result<Quantity> {
    if raw.starts_with('$') {
        if action != Action::Buy || kind != OrderKind::Market {
            bail!("Dollar amounts ({raw}) are only allowed for market buy orders at line {line}");
        }
        return match Quantity::from_str(raw) {
            Ok(Quantity::Dollars(amount)) if amount > Decimal::ZERO => Ok(Quantity::Dollars(amount)),
            Ok(_) => bail!("Dollar amount must be positive at line {line}"),
            Err(_) => bail!("Invalid dollar amount '{raw}' at line {line}"),
        };
    }

    match raw.parse::<i64>() {
        Ok(n) if n > 0 => u32::try_from(n)
            .map(Quantity::Shares)
            .map_err(|_| anyhow!("Invalid quantity '{raw}' at line {line}")),
        Ok(_) => bail!("Quantity must be positive integer at line {line}"),
        Err(_) => bail!("Invalid quantity '{raw}' at line {line}"),
    }
}
