//! The panel's database updates, one function per revision.
//!
//! Revisions missing from the sequence were withdrawn and are never reused.
//! Releases older than 1.1.0 are not supported (see r173).

mod r173_r199;
mod r200_r239;
mod r241_r259;
mod r265_r287;

use crate::schema::IndexKind;
use crate::schema::render::quote_ident;
use crate::update::error::StepError;
use crate::update::registry::{Registry, RegistryError};
use crate::update::step::{Step, StepContext, StepResult};
use tracing::info;

/// Last database update revision known to this build
pub const LAST_UPDATE: u32 = 287;

pub fn steps() -> Vec<Step> {
    [
        r173_r199::steps(),
        r200_r239::steps(),
        r241_r259::steps(),
        r265_r287::steps(),
    ]
    .concat()
}

pub fn registry() -> Result<Registry, RegistryError> {
    Registry::new(LAST_UPDATE, steps())
}

/// Remove deprecated keys from the config table
async fn unset_config_keys(
    ctx: &mut StepContext<'_>,
    keys: &[&str],
) -> Result<StepResult, StepError> {
    for key in keys {
        if ctx.config.unset(key).await? {
            info!("Removed deprecated configuration parameter {}", key);
        }
    }
    Ok(StepResult::NoOp)
}

/// Which indexes to clear from the rebuilt table before the new one is added
enum ObsoleteIndexes<'a> {
    Named(&'a str),
    Covering(&'a [&'a str]),
}

/// Rebuild `table` with a corrected index: move the data aside, recreate the
/// table from it, swap the index, copy the rows back (dropping duplicates) and
/// remove the copy. Every stage checks the schema first, so an interrupted
/// rebuild picks up where it stopped.
async fn rebuild_with_index(
    ctx: &mut StepContext<'_>,
    table: &str,
    obsolete: ObsoleteIndexes<'_>,
    columns: &[&str],
    kind: IndexKind,
    name: Option<&str>,
) -> Result<StepResult, StepError> {
    let aside = format!("old_{}", table);

    let rename = ctx.schema().rename_table(table, &aside).await?;
    ctx.execute_optional(rename).await?;

    if !ctx.schema().is_table(table).await? {
        let create = format!("CREATE TABLE {} LIKE {}", quote_ident(table), quote_ident(&aside));
        ctx.execute(&create).await?;
    }

    match obsolete {
        ObsoleteIndexes::Named(index) => {
            let drop = ctx.schema().drop_index_by_name(table, index).await?;
            ctx.execute_optional(drop).await?;
        }
        ObsoleteIndexes::Covering(covered) => {
            for column in covered {
                let drops = ctx.schema().drop_index_by_column(table, column).await?;
                ctx.execute_all(drops).await?;
            }
        }
    }

    let mut schema = ctx.schema();
    let add = schema.add_index(table, columns, kind, name).await?;
    if !schema.is_table(&aside).await? {
        return Ok(add.into());
    }

    let copy = format!(
        "INSERT IGNORE INTO {} SELECT * FROM {}",
        schema.quote(table),
        schema.quote(&aside)
    );
    let drop = schema.drop_table(&aside);

    Ok(StepResult::from_statements([add, Some(copy), Some(drop)]))
}
