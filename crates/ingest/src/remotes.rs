use sinks::{AirtableTable, PostgresTable};

use crate::classify::Domain;
use crate::config::{Secrets, Settings};
use crate::driver::Driver;

/// Registers the configured mirrors on the driver.
///
/// A mirror that cannot be set up is logged and left out; the history CSV
/// remains the only required sink. Returns how many tables were attached.
pub fn attach_remotes(driver: &mut Driver, settings: &Settings, secrets: &Secrets) -> usize {
    let mut attached = 0;

    if let Some(airtable) = &settings.airtable {
        match &secrets.airtable_token {
            Some(token) => {
                for domain in Domain::ALL {
                    let Some(table_id) = airtable.tables.get(domain.name()) else {
                        continue;
                    };
                    match AirtableTable::new(token, &airtable.base_id, table_id) {
                        Ok(table) => {
                            driver.add_remote(domain, Box::new(table));
                            attached += 1;
                        }
                        Err(e) => tracing::error!("Airtable setup for {} failed: {:#}", domain, e),
                    }
                }
            }
            None => tracing::warn!("Airtable configured but AIRTABLE_TOKEN is not set, skipping"),
        }
    }

    if settings.postgres.enabled {
        match &secrets.database_url {
            Some(url) => {
                for domain in Domain::ALL {
                    match PostgresTable::connect(url, domain.schema()) {
                        Ok(table) => {
                            driver.add_remote(domain, Box::new(table));
                            attached += 1;
                        }
                        Err(e) => {
                            tracing::error!("PostgreSQL setup for {} failed: {:#}", domain, e)
                        }
                    }
                }
            }
            None => tracing::warn!("PostgreSQL enabled but DATABASE_URL is not set, skipping"),
        }
    }

    attached
}
