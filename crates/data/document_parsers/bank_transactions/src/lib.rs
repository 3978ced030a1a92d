use std::io::Read;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{Number, Value};
use utils::parsing::{parse_date, parse_magnitude};
use utils::{
    read_csv_records, ColumnType, DocumentDomain, DomainSchema, KeyPolicy, RawRecord,
    RoundingPolicy, TransformContext,
};

pub const PARSER_NAME: &str = "bank_transactions";

const BALANCE_MARKERS: [&str; 2] = ["Saldo iniziale", "Saldo finale"];

pub static SCHEMA: DomainSchema = DomainSchema {
    name: "movimenti_banca_history",
    columns: &[
        ("record_key", ColumnType::Text),
        ("banca", ColumnType::Text),
        ("numero_conto_corrente", ColumnType::Text),
        ("data_estratto_conto", ColumnType::Date),
        ("codice_iban", ColumnType::Text),
        ("data_operazione", ColumnType::Date),
        ("uscite", ColumnType::Float),
        ("entrate", ColumnType::Float),
        ("descrizione", ColumnType::Text),
        ("causale", ColumnType::Text),
        ("note", ColumnType::Text),
    ],
    mandatory: &[
        "banca",
        "numero_conto_corrente",
        "data_estratto_conto",
        "codice_iban",
        "data_operazione",
        "uscite",
        "entrate",
        "descrizione",
        "causale",
    ],
    key: KeyPolicy::Hashed {
        fields: &["data_operazione", "uscite", "entrate", "descrizione", "causale"],
    },
    rounding: RoundingPolicy::None,
    base_note: "Script completato con successo",
    extraction_fields: &[
        "banca (è una stringa ed è mandatory)",
        "numero_conto_corrente (estrailo come stringa)",
        "data_estratto_conto (è una data, deve estrarla in questo formato yyyy-mm-dd)",
        "codice_iban",
        "data_operazione (è una data, deve estrarla in questo formato yyyy-mm-dd)",
        "uscite (valori double)",
        "entrate (valori double)",
        "descrizione (estrai una breve descrizione che abbia senso per ogni movimento)",
        "causale (prova a categorizzare il movimento dell'estratto conto)",
    ],
};

/// Holder details written on every movement of an account.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AccountInfo {
    #[serde(default)]
    pub banca: String,
    #[serde(default)]
    pub numero_conto_corrente: String,
    #[serde(default)]
    pub codice_iban: String,
}

/// Account metadata per export layout, read from settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BankAccounts {
    #[serde(default)]
    pub ing: AccountInfo,
    #[serde(default)]
    pub deutsche_bank: AccountInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// ING "movimenti" export: DATA VALUTA, USCITE, ENTRATE, CAUSALE, DESCRIZIONE OPERAZIONE
    Ing,
    /// Deutsche Bank export: Valuta (mm/yyyy), Dare, Avere, Operazione, Categoria
    DeutscheBank,
    /// Rows already using the output column names (agent-extracted PDFs)
    Canonical,
}

/// Detects the export layout from the column names of a row.
pub fn detect_layout(raw: &RawRecord) -> Layout {
    if raw.contains_key("DESCRIZIONE OPERAZIONE") || raw.contains_key("USCITE") {
        Layout::Ing
    } else if raw.contains_key("Dare") || raw.contains_key("Avere") {
        Layout::DeutscheBank
    } else {
        Layout::Canonical
    }
}

pub struct BankTransactionsParser {
    pub accounts: BankAccounts,
}

impl BankTransactionsParser {
    pub fn new(accounts: BankAccounts) -> Self {
        Self { accounts }
    }

    /// Reads a `;` bank export into raw rows.
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<Vec<RawRecord>> {
        let rows = read_csv_records(reader)?;
        if let Some(first) = rows.first() {
            tracing::info!(
                "{}: {} row(s) in {:?} layout",
                PARSER_NAME,
                rows.len(),
                detect_layout(first)
            );
        }
        Ok(rows)
    }

    fn derive_ing(&self, raw: &mut RawRecord) {
        set_account(raw, &self.accounts.ing);
        rename(raw, "DESCRIZIONE OPERAZIONE", "descrizione");
        rename(raw, "CAUSALE", "causale");
        let data_operazione = take_date(raw, "DATA VALUTA");
        raw.insert("data_operazione".to_string(), data_operazione);
        split_amounts(raw, "USCITE", "ENTRATE");
    }

    fn derive_deutsche(&self, raw: &mut RawRecord) {
        set_account(raw, &self.accounts.deutsche_bank);
        rename(raw, "Categoria", "descrizione");
        rename(raw, "Operazione", "causale");
        let data_operazione = take_date(raw, "Valuta");
        raw.insert("data_operazione".to_string(), data_operazione);
        split_amounts(raw, "Dare", "Avere");
    }

    fn derive_canonical(&self, raw: &mut RawRecord) {
        for column in ["uscite", "entrate"] {
            if let Some(value) = raw.get(column).cloned() {
                raw.insert(column.to_string(), to_magnitude(value));
            }
        }
    }
}

impl DocumentDomain for BankTransactionsParser {
    fn schema(&self) -> &DomainSchema {
        &SCHEMA
    }

    fn derive_fields(&self, raw: &mut RawRecord, ctx: &TransformContext) {
        let layout = detect_layout(raw);
        match layout {
            Layout::Ing => self.derive_ing(raw),
            Layout::DeutscheBank => self.derive_deutsche(raw),
            Layout::Canonical => self.derive_canonical(raw),
        }

        let has_statement_date = raw
            .get("data_estratto_conto")
            .is_some_and(|v| !v.is_null());
        if layout != Layout::Canonical || !has_statement_date {
            let statement_date = match ctx.statement_date {
                Some(date) => Value::String(date.format("%Y-%m-%d").to_string()),
                None => Value::Null,
            };
            raw.insert("data_estratto_conto".to_string(), statement_date);
        }
    }

    /// Drops balance rows and rows without a description.
    fn keep(&self, raw: &RawRecord) -> bool {
        let Some(descrizione) = raw.get("descrizione").and_then(Value::as_str) else {
            return false;
        };
        !descrizione.trim().is_empty()
            && !BALANCE_MARKERS.iter().any(|m| descrizione.contains(m))
    }
}

fn set_account(raw: &mut RawRecord, account: &AccountInfo) {
    for (column, value) in [
        ("banca", &account.banca),
        ("numero_conto_corrente", &account.numero_conto_corrente),
        ("codice_iban", &account.codice_iban),
    ] {
        let value = if value.is_empty() {
            Value::Null
        } else {
            Value::String(value.clone())
        };
        raw.insert(column.to_string(), value);
    }
}

fn rename(raw: &mut RawRecord, from: &str, to: &str) {
    let value = raw.remove(from).unwrap_or(Value::Null);
    raw.insert(to.to_string(), value);
}

/// Moves a statement date column, normalised to ISO when it parses.
fn take_date(raw: &mut RawRecord, column: &str) -> Value {
    match raw.remove(column) {
        Some(Value::String(s)) => match parse_date(&s) {
            Ok(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            Err(_) => Value::String(s),
        },
        Some(other) => other,
        None => Value::Null,
    }
}

/// Converts the outflow/inflow columns into `uscite`/`entrate` magnitudes.
///
/// A movement fills only one side; the blank side becomes 0.0 as long as the
/// other side holds an amount.
fn split_amounts(raw: &mut RawRecord, outflow: &str, inflow: &str) {
    let uscite = raw.remove(outflow).map(to_magnitude).unwrap_or(Value::Null);
    let entrate = raw.remove(inflow).map(to_magnitude).unwrap_or(Value::Null);

    let (uscite, entrate) = match (uscite.is_number(), entrate.is_number()) {
        (true, false) if entrate.is_null() => (uscite, zero()),
        (false, true) if uscite.is_null() => (zero(), entrate),
        _ => (uscite, entrate),
    };
    raw.insert("uscite".to_string(), uscite);
    raw.insert("entrate".to_string(), entrate);
}

/// Unparseable text is kept so the caster flags it.
fn to_magnitude(value: Value) -> Value {
    match value {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        Value::String(s) => match parse_magnitude(&s).ok().and_then(Number::from_f64) {
            Some(n) => Value::Number(n),
            None => Value::String(s),
        },
        Value::Number(n) => n
            .as_f64()
            .and_then(|f| Number::from_f64(f.abs()))
            .map(Value::Number)
            .unwrap_or(Value::Number(n)),
        other => other,
    }
}

fn zero() -> Value {
    Value::Number(Number::from_f64(0.0).unwrap_or_else(|| Number::from(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use utils::{transform_batch, CellValue, RECORD_KEY_COLUMN};

    fn parser() -> BankTransactionsParser {
        BankTransactionsParser::new(BankAccounts {
            ing: AccountInfo {
                banca: "Ing Arancio".to_string(),
                numero_conto_corrente: "2686433".to_string(),
                codice_iban: "IT00X0000000000000000000000".to_string(),
            },
            deutsche_bank: AccountInfo {
                banca: "Deutsche Bank".to_string(),
                numero_conto_corrente: "823503".to_string(),
                codice_iban: "IT11Y1111111111111111111111".to_string(),
            },
        })
    }

    fn ctx() -> TransformContext {
        TransformContext::new(
            "movimenti_novembre2024.csv",
            NaiveDate::from_ymd_opt(2024, 11, 1),
        )
    }

    #[test]
    fn test_schema_is_valid() {
        SCHEMA.validate().unwrap();
    }

    #[test]
    fn test_ing_csv_filters_balance_rows_and_splits_amounts() {
        let csv = "DATA CONTABILE;DATA VALUTA;USCITE;ENTRATE;CAUSALE;DESCRIZIONE OPERAZIONE\n\
                   01/11/2024;01/11/2024;;;;Saldo iniziale\n\
                   05/11/2024;05/11/2024;-50,00;;PAGAMENTO POS;Spesa supermercato\n";
        let p = parser();
        let rows = p.parse_reader(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        let records = transform_batch(&p, rows, &ctx());
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.get("uscite"), Some(&CellValue::Float(50.0)));
        assert_eq!(r.get("entrate"), Some(&CellValue::Float(0.0)));
        assert_eq!(r.get("descrizione").unwrap().as_text(), Some("Spesa supermercato"));
        assert_eq!(r.get("causale").unwrap().as_text(), Some("PAGAMENTO POS"));
        assert_eq!(r.get("banca").unwrap().as_text(), Some("Ing Arancio"));
        assert_eq!(
            r.get("data_operazione").unwrap().as_date(),
            NaiveDate::from_ymd_opt(2024, 11, 5)
        );
        assert_eq!(
            r.get("data_estratto_conto").unwrap().as_date(),
            NaiveDate::from_ymd_opt(2024, 11, 1)
        );
        assert_eq!(r.note(), "Script completato con successo");
        assert_eq!(r.get(RECORD_KEY_COLUMN).unwrap().as_text().unwrap().len(), 64);
    }

    #[test]
    fn test_rows_without_description_are_dropped() {
        let csv = "DATA CONTABILE;DATA VALUTA;USCITE;ENTRATE;CAUSALE;DESCRIZIONE OPERAZIONE\n\
                   03/11/2024;03/11/2024;-2,00;;COMMISSIONI;\n\
                   05/11/2024;05/11/2024;-50,00;;PAGAMENTO POS;Spesa supermercato\n";
        let p = parser();
        let rows = p.parse_reader(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        let records = transform_batch(&p, rows, &ctx());

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("descrizione").unwrap().as_text(),
            Some("Spesa supermercato")
        );
    }

    #[test]
    fn test_deutsche_layout() {
        let csv = "Valuta;Dare;Avere;Operazione;Categoria\n\
                   11/2024;;+1.200,50;BONIFICO;Stipendio\n\
                   11/2024;;;;Saldo finale\n";
        let p = parser();
        let rows = p.parse_reader(csv.as_bytes()).unwrap();
        let records = transform_batch(&p, rows, &ctx());

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.get("entrate"), Some(&CellValue::Float(1200.5)));
        assert_eq!(r.get("uscite"), Some(&CellValue::Float(0.0)));
        assert_eq!(r.get("banca").unwrap().as_text(), Some("Deutsche Bank"));
        assert_eq!(
            r.get("data_operazione").unwrap().as_date(),
            NaiveDate::from_ymd_opt(2024, 11, 1)
        );
    }

    #[test]
    fn test_same_movement_yields_same_key() {
        let p = parser();
        let row = json!({
            "DATA VALUTA": "05/11/2024",
            "USCITE": "-50,00",
            "ENTRATE": null,
            "CAUSALE": "PAGAMENTO POS",
            "DESCRIZIONE OPERAZIONE": "Spesa"
        });
        let a = transform_batch(&p, vec![row.as_object().unwrap().clone()], &ctx());
        let other_ctx = TransformContext::new("altro.csv", None);
        let b = transform_batch(&p, vec![row.as_object().unwrap().clone()], &other_ctx);

        assert_eq!(a[0].key(&SCHEMA), b[0].key(&SCHEMA));
    }

    #[test]
    fn test_canonical_pdf_rows_keep_agent_metadata() {
        let p = parser();
        let row = json!({
            "banca": "Banca Sella",
            "numero_conto_corrente": "42",
            "data_estratto_conto": "2024-09-30",
            "codice_iban": "IT22Z",
            "data_operazione": "2024-09-12",
            "uscite": -12.3,
            "entrate": 0,
            "descrizione": "Caffè",
            "causale": "POS"
        });
        let records = transform_batch(&p, vec![row.as_object().unwrap().clone()], &ctx());

        let r = &records[0];
        assert_eq!(r.get("banca").unwrap().as_text(), Some("Banca Sella"));
        assert_eq!(r.get("uscite"), Some(&CellValue::Float(12.3)));
        assert_eq!(
            r.get("data_estratto_conto").unwrap().as_date(),
            NaiveDate::from_ymd_opt(2024, 9, 30)
        );
        assert_eq!(r.note(), "Script completato con successo");
    }

    #[test]
    fn test_unparseable_amount_is_flagged() {
        let p = parser();
        let row = json!({
            "DATA VALUTA": "05/11/2024",
            "USCITE": "n/d",
            "ENTRATE": null,
            "CAUSALE": "X",
            "DESCRIZIONE OPERAZIONE": "Y"
        });
        let records = transform_batch(&p, vec![row.as_object().unwrap().clone()], &ctx());

        let r = &records[0];
        assert_eq!(r.get("uscite"), Some(&CellValue::Float(0.0)));
        assert!(r.note().contains("Verificare uscite mancante"));
        assert!(r.note().contains("Verificare entrate mancante"));
    }

    #[test]
    fn test_missing_account_settings_are_flagged() {
        let p = BankTransactionsParser::new(BankAccounts::default());
        let row = json!({
            "DATA VALUTA": "05/11/2024",
            "USCITE": "-1,00",
            "CAUSALE": "X",
            "DESCRIZIONE OPERAZIONE": "Y"
        });
        let records = transform_batch(&p, vec![row.as_object().unwrap().clone()], &ctx());
        let note = records[0].note();
        assert!(note.contains("Verificare banca mancante"));
        assert!(note.contains("Verificare codice_iban mancante"));
        assert!(!note.contains("Verificare entrate mancante"));
    }
}
