use std::collections::HashMap;
use std::io::Read;

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Row enums
// ---------------------------------------------------------------------------

/// Order side as brokers report it. SHORT is an import-level distinction;
/// in the ledger a short entry becomes a SELL event with negative shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RowSide {
    Buy,
    Short,
    Sell,
}

impl RowSide {
    pub fn from_export_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "B" => Some(RowSide::Buy),
            "SHORT" | "SS" | "SELL SHORT" => Some(RowSide::Short),
            "SELL" | "S" => Some(RowSide::Sell),
            _ => None,
        }
    }

    /// Deterministic tie-break for same-timestamp fills: BUY < SHORT < SELL.
    /// Same-timestamp stop-loss fills must replay after the buy they protect.
    pub fn priority(&self) -> u8 {
        match self {
            RowSide::Buy => 0,
            RowSide::Short => 1,
            RowSide::Sell => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RowSide::Buy => "BUY",
            RowSide::Short => "SHORT",
            RowSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for RowSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RowStatus {
    Filled,
    Cancelled,
    Pending,
}

impl RowStatus {
    pub fn from_export_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "FILLED" | "FILL" | "EXECUTED" => Some(RowStatus::Filled),
            "CANCELLED" | "CANCELED" => Some(RowStatus::Cancelled),
            "PENDING" | "OPEN" | "WORKING" => Some(RowStatus::Pending),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Filled => "FILLED",
            RowStatus::Cancelled => "CANCELLED",
            RowStatus::Pending => "PENDING",
        }
    }
}

// ---------------------------------------------------------------------------
// Broker profile
// ---------------------------------------------------------------------------

/// Column mapping for a broker's export format. Custom profiles deserialize
/// from JSON supplied by the caller; the default matches the generic export
/// shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerProfile {
    pub symbol: String,
    pub side: String,
    pub status: String,
    pub shares: String,
    pub price: String,
    pub placed_at: String,
    pub filled_at: String,
    pub datetime_format: String,
}

impl Default for BrokerProfile {
    fn default() -> Self {
        Self {
            symbol: "symbol".into(),
            side: "side".into(),
            status: "status".into(),
            shares: "quantity".into(),
            price: "price".into(),
            placed_at: "placed_at".into(),
            filled_at: "filled_at".into(),
            datetime_format: "%Y-%m-%d %H:%M:%S".into(),
        }
    }
}

impl BrokerProfile {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ---------------------------------------------------------------------------
// Parsed rows
// ---------------------------------------------------------------------------

/// One normalized broker export row.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRow {
    /// 1-based CSV line (header is line 1), the import correlation id.
    pub line: u64,
    pub symbol: String,
    pub side: RowSide,
    pub status: RowStatus,
    pub shares: i64,
    pub price: Decimal,
    pub placed_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl BrokerRow {
    /// Execution time for ordering: fill time, falling back to placed time.
    pub fn executed_at(&self) -> DateTime<Utc> {
        self.filled_at.unwrap_or(self.placed_at)
    }

    /// A protective sell that executed at a different time than it was
    /// placed — the signature of a stop that triggered.
    pub fn is_triggered_stop(&self) -> bool {
        self.status == RowStatus::Filled
            && self.side == RowSide::Sell
            && self.filled_at.is_some()
            && self.filled_at != Some(self.placed_at)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub line: u64,
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Parse a broker CSV export into normalized rows.
///
/// Row-level failures (unparseable date/price/quantity, unknown side or
/// status) accumulate; if any accumulate the whole batch is rejected with
/// the full list — nothing downstream sees a partial parse.
pub fn parse_rows<R: Read>(
    reader: R,
    profile: &BrokerProfile,
) -> Result<Vec<BrokerRow>, Vec<RowError>> {
    let mut csv_reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = match csv_reader.headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            return Err(vec![RowError {
                line: 1,
                message: format!("unreadable header row: {e}"),
            }])
        }
    };
    let index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let mut columns = Vec::new();
    for name in [
        &profile.symbol,
        &profile.side,
        &profile.status,
        &profile.shares,
        &profile.price,
        &profile.placed_at,
        &profile.filled_at,
    ] {
        match index.get(&name.to_lowercase()) {
            Some(i) => columns.push(*i),
            None => {
                return Err(vec![RowError {
                    line: 1,
                    message: format!("missing column \"{name}\""),
                }])
            }
        }
    }
    let (sym_i, side_i, status_i, shares_i, price_i, placed_i, filled_i) = (
        columns[0], columns[1], columns[2], columns[3], columns[4], columns[5], columns[6],
    );

    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for (n, record) in csv_reader.records().enumerate() {
        let line = (n + 2) as u64;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                errors.push(RowError {
                    line,
                    message: format!("malformed record: {e}"),
                });
                continue;
            }
        };
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let mut row_errors = Vec::new();

        let symbol = field(sym_i).to_uppercase();
        if symbol.is_empty() {
            row_errors.push("empty symbol".to_string());
        }

        let side = RowSide::from_export_str(field(side_i));
        if side.is_none() {
            row_errors.push(format!("unknown side \"{}\"", field(side_i)));
        }

        let status = RowStatus::from_export_str(field(status_i));
        if status.is_none() {
            row_errors.push(format!("unknown status \"{}\"", field(status_i)));
        }

        let shares = match field(shares_i).parse::<i64>() {
            Ok(s) if s > 0 => Some(s),
            Ok(s) => {
                row_errors.push(format!("quantity must be positive, got {s}"));
                None
            }
            Err(_) => {
                row_errors.push(format!("unparseable quantity \"{}\"", field(shares_i)));
                None
            }
        };

        let price = match field(price_i).parse::<Decimal>() {
            Ok(p) if p > Decimal::ZERO => Some(p),
            Ok(p) => {
                row_errors.push(format!("price must be positive, got {p}"));
                None
            }
            Err(_) => {
                row_errors.push(format!("unparseable price \"{}\"", field(price_i)));
                None
            }
        };

        let placed_at = match parse_datetime(field(placed_i), &profile.datetime_format) {
            Some(t) => Some(t),
            None => {
                row_errors.push(format!("unparseable placed time \"{}\"", field(placed_i)));
                None
            }
        };

        // Fill time is optional (cancelled/pending orders never filled).
        let filled_raw = field(filled_i);
        let filled_at = if filled_raw.is_empty() {
            None
        } else {
            match parse_datetime(filled_raw, &profile.datetime_format) {
                Some(t) => Some(t),
                None => {
                    row_errors.push(format!("unparseable fill time \"{filled_raw}\""));
                    None
                }
            }
        };

        if row_errors.is_empty() {
            // All Somes guaranteed by the empty error list.
            if let (Some(side), Some(status), Some(shares), Some(price), Some(placed_at)) =
                (side, status, shares, price, placed_at)
            {
                rows.push(BrokerRow {
                    line,
                    symbol,
                    side,
                    status,
                    shares,
                    price,
                    placed_at,
                    filled_at,
                });
            }
        } else {
            errors.extend(row_errors.into_iter().map(|message| RowError { line, message }));
        }
    }

    if errors.is_empty() {
        Ok(rows)
    } else {
        Err(errors)
    }
}

fn parse_datetime(raw: &str, format: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, format)
        .ok()
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
symbol,side,status,quantity,price,placed_at,filled_at
AAPL,BUY,FILLED,100,150.25,2024-03-01 09:30:00,2024-03-01 09:30:00
AAPL,SELL,CANCELLED,100,145.00,2024-03-01 09:30:00,
TSLA,SELL SHORT,FILLED,50,200.00,2024-03-02 10:00:00,2024-03-02 10:00:01
";

    #[test]
    fn test_parses_default_profile() {
        let rows = parse_rows(EXPORT.as_bytes(), &BrokerProfile::default()).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].symbol, "AAPL");
        assert_eq!(rows[0].side, RowSide::Buy);
        assert_eq!(rows[0].status, RowStatus::Filled);
        assert_eq!(rows[0].shares, 100);
        assert_eq!(rows[0].price, Decimal::new(15025, 2));
        assert_eq!(rows[0].line, 2);

        assert_eq!(rows[1].status, RowStatus::Cancelled);
        assert!(rows[1].filled_at.is_none());

        assert_eq!(rows[2].side, RowSide::Short);
    }

    #[test]
    fn test_accumulates_all_row_errors() {
        let export = "\
symbol,side,status,quantity,price,placed_at,filled_at
AAPL,HOLD,FILLED,100,150.25,2024-03-01 09:30:00,
,BUY,FILLED,abc,150.25,not-a-date,
";
        let errors = parse_rows(export.as_bytes(), &BrokerProfile::default()).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.line == 2 && e.message.contains("side")));
        assert!(errors.iter().any(|e| e.line == 3 && e.message.contains("symbol")));
        assert!(errors.iter().any(|e| e.line == 3 && e.message.contains("quantity")));
        assert!(errors.iter().any(|e| e.line == 3 && e.message.contains("placed time")));
    }

    #[test]
    fn test_rejects_non_positive_quantity_and_price() {
        let export = "\
symbol,side,status,quantity,price,placed_at,filled_at
AAPL,BUY,FILLED,0,150.25,2024-03-01 09:30:00,
AAPL,BUY,FILLED,10,-1,2024-03-01 09:30:00,
";
        let errors = parse_rows(export.as_bytes(), &BrokerProfile::default()).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_missing_column_fails_fast() {
        let export = "ticker,side\nAAPL,BUY\n";
        let errors = parse_rows(export.as_bytes(), &BrokerProfile::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("missing column"));
    }

    #[test]
    fn test_custom_profile_from_json() {
        let profile = BrokerProfile::from_json(
            r#"{
                "symbol": "Ticker",
                "side": "Action",
                "status": "State",
                "shares": "Qty",
                "price": "Px",
                "placed_at": "Placed",
                "filled_at": "Filled",
                "datetime_format": "%m/%d/%Y %H:%M"
            }"#,
        )
        .unwrap();

        let export = "\
Ticker,Action,State,Qty,Px,Placed,Filled
msft,B,EXECUTED,25,411.50,03/01/2024 09:31,03/01/2024 09:31
";
        let rows = parse_rows(export.as_bytes(), &profile).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "MSFT");
        assert_eq!(rows[0].side, RowSide::Buy);
    }

    #[test]
    fn test_triggered_stop_detection() {
        let rows = parse_rows(EXPORT.as_bytes(), &BrokerProfile::default()).unwrap();
        // Fill at placed time: not a triggered stop.
        assert!(!rows[0].is_triggered_stop());
        // Short fill a second after placement is a SHORT, not a SELL.
        assert!(!rows[2].is_triggered_stop());
    }
}
