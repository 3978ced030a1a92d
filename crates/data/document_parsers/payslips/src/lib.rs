use serde::Deserialize;
use serde_json::Value;
use utils::parsing::parse_italian_month_year;
use utils::{
    normalize_numeric_text, ColumnType, DocumentDomain, DomainSchema, KeyPolicy, RawRecord,
    RoundingPolicy, TransformContext,
};

pub const PARSER_NAME: &str = "payslips";

/// Overtime surcharge applied by the employer's contract, in percent.
pub const OVERTIME_SURCHARGE_PERCENT: i64 = 15;

pub static SCHEMA: DomainSchema = DomainSchema {
    name: "buste_paga_history",
    columns: &[
        ("record_key", ColumnType::Text),
        ("ragione_sociale_azienda", ColumnType::Text),
        ("date_periodo_di_retribuzione", ColumnType::Date),
        ("string_periodo_di_retribuzione", ColumnType::Text),
        ("retribuzione_minima_lorda", ColumnType::Float),
        ("giorni_lavorati", ColumnType::Int),
        ("ore_lavorate", ColumnType::Int),
        ("percentuale_maggiorazione_ore_straordinario", ColumnType::Int),
        ("ore_straordinarie", ColumnType::Int),
        ("irpef_pagata", ColumnType::Float),
        ("totale_competenze", ColumnType::Float),
        ("totale_trattenute", ColumnType::Float),
        ("arrotondamento", ColumnType::Float),
        ("netto_del_mese", ColumnType::Int),
        ("retribuzione_utile_tfr", ColumnType::Float),
        ("quota_tfr", ColumnType::Float),
        ("totale_ferie_rimanenti", ColumnType::Float),
        ("totale_permessi_rimanenti", ColumnType::Float),
        ("note", ColumnType::Text),
    ],
    // Checked on the extracted names, before they are copied to output columns
    mandatory: &[
        "periodo_di_retribuzione",
        "totale_retribuzione_minima_lorda",
        "ritenute_irpef",
        "totale_competenze",
        "totale_trattenute",
        "arrotondamento",
        "netto_del_mese",
        "retribuzione_utile_tfr",
        "quota_tfr",
        "totale_ferie_rimanenti",
        "totale_permessi_rimanenti",
    ],
    key: KeyPolicy::Hashed {
        fields: &["date_periodo_di_retribuzione", "netto_del_mese"],
    },
    rounding: RoundingPolicy::CeilFloatsTwoDecimals,
    base_note: "Script completato con successo",
    extraction_fields: &[
        "periodo_di_retribuzione (è una stringa ed è mandatory)",
        "totale_retribuzione_minima_lorda (è un int ed è la somma di Paga Base, Conting, 3Elemen e Sup. ass.) è mandatory",
        "giorni_lavorati (è un double e non sono mandatory, nella sezione LAVORATO quarto valore)",
        "ore_lavorate (è un double e non sono mandatory, ore ordinarie nella sezione LAVORATO quinto valore)",
        "ore_straordinarie (è un double e non sono mandatory, nella sezione LAVORATO)",
        "ritenute_irpef (è un double ed è mandatory)",
        "totale_competenze (è un double ed è mandatory)",
        "totale_trattenute (è un double ed è mandatory)",
        "arrotondamento (è un double ed è mandatory)",
        "netto_del_mese (è un double ed è mandatory)",
        "retribuzione_utile_tfr (è un double ed è mandatory)",
        "quota_tfr (è un double ed è mandatory)",
        "totale_ferie_rimanenti (Saldo Ferie è un double non arrotondare)",
        "totale_permessi_rimanenti (Saldo R.O.L è un double non arrotondare)",
    ],
};

/// Payslip settings: the employer written on every record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayslipSettings {
    #[serde(default)]
    pub ragione_sociale_azienda: String,
}

pub struct PayslipsParser {
    pub settings: PayslipSettings,
}

impl PayslipsParser {
    pub fn new(settings: PayslipSettings) -> Self {
        Self { settings }
    }
}

impl DocumentDomain for PayslipsParser {
    fn schema(&self) -> &DomainSchema {
        &SCHEMA
    }

    fn derive_fields(&self, raw: &mut RawRecord, _ctx: &TransformContext) {
        let employer = match self.settings.ragione_sociale_azienda.trim() {
            "" => Value::Null,
            name => Value::String(name.to_string()),
        };
        raw.insert("ragione_sociale_azienda".to_string(), employer);

        let periodo = raw.get("periodo_di_retribuzione").cloned().unwrap_or(Value::Null);
        let date = periodo.as_str().and_then(parse_italian_month_year);
        if date.is_none() && !periodo.is_null() {
            tracing::warn!("{}: unrecognised pay period {}", PARSER_NAME, periodo);
        }
        raw.insert(
            "date_periodo_di_retribuzione".to_string(),
            date.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
        );
        raw.insert("string_periodo_di_retribuzione".to_string(), periodo);

        for (target, source) in [
            ("retribuzione_minima_lorda", "totale_retribuzione_minima_lorda"),
            ("irpef_pagata", "ritenute_irpef"),
        ] {
            let value = raw.get(source).cloned().unwrap_or(Value::Null);
            raw.insert(target.to_string(), value);
        }

        raw.insert(
            "percentuale_maggiorazione_ore_straordinario".to_string(),
            Value::from(OVERTIME_SURCHARGE_PERCENT),
        );

        normalize_numeric_text(&SCHEMA, raw);
    }
}
