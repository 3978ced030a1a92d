use serde_json::Value;
use utils::parsing::parse_italian_month_year;
use utils::{
    normalize_numeric_text, ColumnType, DocumentDomain, DomainSchema, KeyPolicy, RawRecord,
    RoundingPolicy, TransformContext,
};

pub const PARSER_NAME: &str = "mobility_subscription";

/// Monthly pay-per-km car subscription statements (beRebel).
pub static SCHEMA: DomainSchema = DomainSchema {
    name: "berebel_history",
    columns: &[
        ("periodo_estratto_conto", ColumnType::Text),
        ("date_estratto_conto", ColumnType::Date),
        ("targa", ColumnType::Text),
        ("minimo_mensile", ColumnType::Float),
        ("costo_al_km", ColumnType::Float),
        ("km_percorsi", ColumnType::Int),
        ("km_inclusi", ColumnType::Int),
        ("km_da_pagare", ColumnType::Int),
        ("km_residui", ColumnType::Int),
        ("premio_di_conguaglio", ColumnType::Float),
        ("totale_pagato", ColumnType::Float),
        ("note", ColumnType::Text),
    ],
    mandatory: &[
        "minimo_mensile",
        "periodo_estratto_conto",
        "costo_al_km",
        "targa",
        "km_percorsi",
        "km_inclusi",
        "km_da_pagare",
        "km_residui",
        "premio_di_conguaglio",
        "totale_pagato",
    ],
    key: KeyPolicy::Natural {
        column: "periodo_estratto_conto",
    },
    rounding: RoundingPolicy::CeilFloatsTwoDecimals,
    base_note: "Script completato con successo",
    extraction_fields: &[
        "minimo_mensile (è un double ed è mandatory)",
        "periodo_estratto_conto (è una string ed è mandatory, esempio: Novembre 2024)",
        "costo_al_km (è un double ed è mandatory)",
        "targa (è una string ed è mandatory)",
        "km_percorsi (è un intero ed è mandatory - è il primo valore dei quattro)",
        "km_inclusi (è un intero ed è mandatory - è il secondo valore dei quattro)",
        "km_da_pagare (è un intero ed è mandatory - è il terzo valore dei quattro)",
        "km_residui (è un intero ed è mandatory - è il quarto valore dei quattro)",
        "premio_di_conguaglio (è un double ed è mandatory)",
        "totale_pagato (è un double ed è mandatory)",
    ],
};

#[derive(Debug, Default)]
pub struct MobilitySubscriptionParser;

impl MobilitySubscriptionParser {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentDomain for MobilitySubscriptionParser {
    fn schema(&self) -> &DomainSchema {
        &SCHEMA
    }

    fn derive_fields(&self, raw: &mut RawRecord, _ctx: &TransformContext) {
        normalize_numeric_text(&SCHEMA, raw);

        // "Novembre 2024" -> 2024-11-01
        let date = raw
            .get("periodo_estratto_conto")
            .and_then(Value::as_str)
            .and_then(parse_italian_month_year);
        let value = match date {
            Some(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            None => {
                tracing::warn!("{}: no month/year in periodo_estratto_conto", PARSER_NAME);
                Value::Null
            }
        };
        raw.insert("date_estratto_conto".to_string(), value);
    }
}
