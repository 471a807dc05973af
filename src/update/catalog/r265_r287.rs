//! Updates r265 to r287: index repairs, traffic keys, IP lists and reseller permissions.
//!
//! r265, r266, r268, r269 and r271 redo earlier revisions (r202/r260, r210/r261,
//! r237/r263, r240/r264, r234/r262/r267) whose first implementations left some
//! databases without the intended index.

use super::{ObsoleteIndexes, rebuild_with_index, unset_config_keys};
use crate::schema::IndexKind;
use crate::schema::render::escape_string;
use crate::update::step::{Step, StepContext, StepFuture, StepResult};

pub(super) fn steps() -> Vec<Step> {
    vec![
        Step::new(265, "Add unique mail_users.mail_addr index", r265),
        Step::new(266, "Add unique server_traffic.traff_time index", r266),
        Step::new(268, "Add unique domain_traffic (domain_id, dtraff_time) index", r268),
        Step::new(269, "Add httpd_vlogger primary key", r269),
        Step::new(270, "Drop leftover register_globals columns", r270),
        Step::new(271, "Add unique php_ini (admin_id, domain_id, domain_type) index", r271),
        Step::new(272, "Key domain_traffic on (domain_id, dtraff_time)", r272),
        Step::new(274, "Key server_traffic on traff_time", r274),
        Step::new(275, "Add PHP configuration level columns", r275),
        Step::new(277, "Remove CREATE_DEFAULT_EMAIL_ADDRESSES parameter", r277),
        Step::new(278, "Store status fields as TEXT", r278),
        Step::new(279, "Add subdomain IP columns", r279),
        Step::new(280, "Add domain.domain_ips", r280),
        Step::new(281, "Allow several IPs per domain and alias", r281),
        Step::new(282, "Separate reseller IPs with commas", r282),
        Step::new(283, "Rename IP list columns", r283),
        Step::new(284, "Rename domain_aliasses to domain_aliases", r284),
        Step::new(285, "Remove software installer tables and columns", r285),
        Step::new(286, "Update reseller permission columns", r286),
        Step::new(287, "Reset hosting plans", r287),
    ]
}

const RESELLER_IPS: &str = "SELECT reseller_id, reseller_ips FROM reseller_props";

fn r265<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        rebuild_with_index(
            ctx,
            "mail_users",
            ObsoleteIndexes::Named("mail_addr"),
            &["mail_addr"],
            IndexKind::Unique,
            Some("mail_addr"),
        )
        .await
    })
}

fn r266<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        rebuild_with_index(
            ctx,
            "server_traffic",
            ObsoleteIndexes::Named("traff_time"),
            &["traff_time"],
            IndexKind::Unique,
            Some("traff_time"),
        )
        .await
    })
}

fn r268<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        rebuild_with_index(
            ctx,
            "domain_traffic",
            ObsoleteIndexes::Named("i_unique_timestamp"),
            &["domain_id", "dtraff_time"],
            IndexKind::Unique,
            Some("i_unique_timestamp"),
        )
        .await
    })
}

fn r269<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        rebuild_with_index(
            ctx,
            "httpd_vlogger",
            ObsoleteIndexes::Named("PRIMARY"),
            &["vhost", "ldate"],
            IndexKind::Primary,
            None,
        )
        .await
    })
}

/// Leftovers some older upgrade paths never removed
fn r270<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        Ok(StepResult::from_statements([
            schema
                .drop_column("reseller_props", "php_ini_al_register_globals")
                .await?,
            schema
                .drop_column("domain", "phpini_perm_register_globals")
                .await?,
            schema.drop_column("php_ini", "register_globals").await?,
        ]))
    })
}

fn r271<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let columns = ["admin_id", "domain_id", "domain_type"];
        rebuild_with_index(
            ctx,
            "php_ini",
            ObsoleteIndexes::Covering(&columns),
            &columns,
            IndexKind::Unique,
            Some("unique_php_ini"),
        )
        .await
    })
}

/// Replace the surrogate dtraff_id key with a natural primary key
fn r272<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let drop = ctx.schema().drop_column("domain_traffic", "dtraff_id").await?;
        ctx.execute_optional(drop).await?;

        let drop = ctx
            .schema()
            .drop_index_by_name("domain_traffic", "i_unique_timestamp")
            .await?;
        ctx.execute_optional(drop).await?;

        Ok(ctx
            .schema()
            .add_index("domain_traffic", &["domain_id", "dtraff_time"], IndexKind::Primary, None)
            .await?
            .into())
    })
}

fn r274<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let drop = ctx.schema().drop_column("server_traffic", "straff_id").await?;
        ctx.execute_optional(drop).await?;

        let drops = ctx
            .schema()
            .drop_index_by_column("server_traffic", "traff_time")
            .await?;
        ctx.execute_all(drops).await?;

        let add = ctx
            .schema()
            .add_index("server_traffic", &["traff_time"], IndexKind::Primary, None)
            .await?;

        // Primary key parts must be NOT NULL
        Ok(StepResult::from_statements([
            Some(
                "ALTER TABLE server_traffic MODIFY `traff_time` INT(10) UNSIGNED NOT NULL"
                    .to_string(),
            ),
            add,
        ]))
    })
}

fn r275<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        let levels = "ENUM( 'per_domain', 'per_site', 'per_user' ) NOT NULL DEFAULT 'per_site'";

        Ok(StepResult::from_statements([
            schema
                .add_column(
                    "domain",
                    "phpini_perm_config_level",
                    &format!("{levels} AFTER phpini_perm_system"),
                )
                .await?,
            schema
                .add_column(
                    "reseller_props",
                    "php_ini_al_config_level",
                    &format!("{levels} AFTER php_ini_system"),
                )
                .await?,
        ]))
    })
}

fn r277<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { unset_config_keys(ctx, &["CREATE_DEFAULT_EMAIL_ADDRESSES"]).await })
}

/// Status columns that become TEXT
const STATUS_COLUMNS: [(&str, &str); 12] = [
    ("admin", "admin_status"),
    ("domain", "domain_status"),
    ("domain_aliasses", "alias_status"),
    ("ftp_users", "status"),
    ("htaccess", "status"),
    ("htaccess_groups", "status"),
    ("htaccess_users", "status"),
    ("mail_users", "status"),
    ("server_ips", "ip_status"),
    ("ssl_certs", "status"),
    ("subdomain", "subdomain_status"),
    ("subdomain_alias", "subdomain_alias_status"),
];

fn r278<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        // A TEXT column can only be indexed with a prefix length
        let drops = ctx.schema().drop_index_by_column("mail_users", "status").await?;
        ctx.execute_all(drops).await?;

        let mut schema = ctx.schema();
        let mut statements: Vec<Option<String>> = STATUS_COLUMNS
            .iter()
            .map(|(table, column)| {
                Some(schema.change_column(
                    table,
                    column,
                    &format!("`{column}` text collate utf8_unicode_ci NOT NULL"),
                ))
            })
            .collect();
        statements.push(
            schema
                .add_index("mail_users", &["status(255)"], IndexKind::Index, Some("status"))
                .await?,
        );

        Ok(StepResult::from_statements(statements))
    })
}

fn r279<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        let mut statements = Vec::new();

        if let Some(add) = schema
            .add_column("subdomain", "subdomain_ip_id", "TEXT NOT NULL AFTER subdomain_name")
            .await?
        {
            statements.push(add);
            statements.push(
                "UPDATE subdomain t1 JOIN domain t2 USING(domain_id) SET t1.subdomain_ip_id = t2.domain_ip_id"
                    .to_string(),
            );
        }

        if let Some(add) = schema
            .add_column(
                "subdomain_alias",
                "subdomain_alias_ip_id",
                "TEXT NOT NULL AFTER subdomain_alias_name",
            )
            .await?
        {
            statements.push(add);
            statements.push(
                "UPDATE subdomain_alias t1 JOIN domain_aliasses t2 USING(alias_id) \
                 SET t1.subdomain_alias_ip_id = t2.alias_ip_id"
                    .to_string(),
            );
        }

        Ok(statements.into())
    })
}

fn r280<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let add = ctx
            .schema()
            .add_column("domain", "domain_ips", "TEXT NOT NULL AFTER domain_subd_limit")
            .await?;

        Ok(match add {
            Some(add) => {
                vec![add, "UPDATE domain SET domain_ips = domain_ip_id".to_string()].into()
            }
            None => StepResult::NoOp,
        })
    })
}

fn r281<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let schema = ctx.schema();
        Ok(vec![
            schema.change_column("domain", "domain_ip_id", "`domain_ip_id` text NOT NULL"),
            schema.change_column("domain_aliasses", "alias_ip_id", "`alias_ip_id` text NOT NULL"),
        ]
        .into())
    })
}

/// `1;2;` becomes `1,2`
fn comma_separated_ips(value: &str) -> String {
    value.trim_matches(';').split(';').collect::<Vec<_>>().join(",")
}

fn r282<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let resellers = ctx.db.fetch_all(RESELLER_IPS, &[]).await?;

        let mut statements = Vec::new();
        for row in &resellers {
            let ips = row.get("reseller_ips").unwrap_or_default();
            if !ips.contains(';') {
                continue;
            }

            statements.push(format!(
                "UPDATE reseller_props SET reseller_ips = {} WHERE reseller_id = {}",
                escape_string(&comma_separated_ips(ips)),
                escape_string(row.require("reseller_id")?)
            ));
        }

        Ok(statements.into())
    })
}

fn r283<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let schema = ctx.schema();
        Ok(vec![
            schema.change_column("domain", "domain_ips", "`domain_client_ips` text NOT NULL"),
            schema.change_column("domain", "domain_ip_id", "`domain_ips` text NOT NULL"),
            schema.change_column("domain_aliasses", "alias_ip_id", "`alias_ips` text NOT NULL"),
            schema.change_column("subdomain", "subdomain_ip_id", "`subdomain_ips` text NOT NULL"),
            schema.change_column(
                "subdomain_alias",
                "subdomain_alias_ip_id",
                "`subdomain_alias_ips` text NOT NULL",
            ),
        ]
        .into())
    })
}

fn r284<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .rename_table("domain_aliasses", "domain_aliases")
            .await?
            .into())
    })
}

fn r285<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        let mut statements = vec![schema.drop_column("domain", "domain_software_allowed").await?];

        for column in ["software_allowed", "softwaredepot_allowed", "websoftwaredepot_allowed"] {
            statements.push(schema.drop_column("reseller_props", column).await?);
        }
        for table in [
            "web_software",
            "web_software_inst",
            "web_software_depot",
            "web_software_options",
        ] {
            statements.push(Some(schema.drop_table(table)));
        }

        Ok(StepResult::from_statements(statements))
    })
}

/// Reseller permissions become tinyint flags. The old support_system flag
/// is dropped first so the flag column can be added back with its new type.
fn r286<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let drop = ctx.schema().drop_column("reseller_props", "support_system").await?;
        ctx.execute_optional(drop).await?;

        let mut schema = ctx.schema();
        let flag = "tinyint(1) NOT NULL DEFAULT '0'";

        let mut statements = vec![
            Some(schema.change_column(
                "reseller_props",
                "php_ini_system",
                &format!("`php_ini` {flag}"),
            )),
            Some(schema.change_column(
                "reseller_props",
                "php_ini_al_config_level",
                "`php_ini_config_level` ENUM( 'per_domain', 'per_site', 'per_user' ) NOT NULL DEFAULT 'per_site'",
            )),
        ];
        for (old, new) in [
            ("php_ini_al_disable_functions", "php_ini_disable_functions"),
            ("php_ini_al_mail_function", "php_ini_mail_function"),
            ("php_ini_al_allow_url_fopen", "php_ini_allow_url_fopen"),
            ("php_ini_al_display_errors", "php_ini_display_errors"),
        ] {
            statements.push(Some(schema.change_column(
                "reseller_props",
                old,
                &format!("`{new}` {flag}"),
            )));
        }

        for column in [
            "php",
            "cgi",
            "custom_dns",
            "external_mail_server",
            "support_system",
            "backup",
            "webstats",
        ] {
            statements.push(schema.add_column("reseller_props", column, flag).await?);
        }

        Ok(StepResult::from_statements(statements))
    })
}

fn r287<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { Ok("TRUNCATE hosting_plans".into()) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemSettings;
    use crate::db::Row;
    use crate::db::testing::{FakeDatabase, MemoryConfigStore};

    #[test]
    fn test_comma_separated_ips() {
        assert_eq!(comma_separated_ips("1;2;3;"), "1,2,3");
        assert_eq!(comma_separated_ips(";4;"), "4");
    }

    #[tokio::test]
    async fn test_r270_drops_only_remaining_register_globals_columns() {
        let mut db = FakeDatabase::new()
            .with_table("reseller_props", &["id", "php_ini_al_register_globals"])
            .with_table("domain", &["domain_id", "domain_name"])
            .with_table("php_ini", &["id", "register_globals"]);
        let mut config = MemoryConfigStore::new();
        let settings = SystemSettings::default();
        let mut ctx = StepContext {
            revision: 270,
            db: &mut db,
            config: &mut config,
            settings: &settings,
        };

        let result = r270(&mut ctx).await.unwrap();

        assert_eq!(
            result.statements(),
            [
                "ALTER TABLE `reseller_props` DROP `php_ini_al_register_globals`",
                "ALTER TABLE `php_ini` DROP `register_globals`",
            ]
        );
    }

    #[tokio::test]
    async fn test_r272_replaces_surrogate_key() {
        let mut db = FakeDatabase::new()
            .with_table("domain_traffic", &["dtraff_id", "domain_id", "dtraff_time", "dtraff_web"])
            .with_index("domain_traffic", "PRIMARY", &["dtraff_id"], true)
            .with_index(
                "domain_traffic",
                "i_unique_timestamp",
                &["domain_id", "dtraff_time"],
                true,
            );
        let mut config = MemoryConfigStore::new();
        let settings = SystemSettings::default();
        let mut ctx = StepContext {
            revision: 272,
            db: &mut db,
            config: &mut config,
            settings: &settings,
        };

        let result = r272(&mut ctx).await.unwrap();

        assert_eq!(
            result.statements(),
            ["ALTER TABLE `domain_traffic` ADD PRIMARY KEY (`domain_id`, `dtraff_time`)"]
        );
        assert_eq!(
            db.executed(),
            [
                "ALTER TABLE `domain_traffic` DROP `dtraff_id`",
                "ALTER TABLE `domain_traffic` DROP INDEX `i_unique_timestamp`",
            ]
        );
    }

    #[tokio::test]
    async fn test_r274_is_repeatable() {
        let mut db = FakeDatabase::new()
            .with_table("server_traffic", &["traff_time", "bytes_in"])
            .with_index("server_traffic", "PRIMARY", &["traff_time"], true);
        let mut config = MemoryConfigStore::new();
        let settings = SystemSettings::default();
        let mut ctx = StepContext {
            revision: 274,
            db: &mut db,
            config: &mut config,
            settings: &settings,
        };

        // Already keyed: the covering primary key is dropped and added back
        let result = r274(&mut ctx).await.unwrap();

        assert_eq!(
            result.statements(),
            [
                "ALTER TABLE server_traffic MODIFY `traff_time` INT(10) UNSIGNED NOT NULL",
                "ALTER TABLE `server_traffic` ADD PRIMARY KEY (`traff_time`)",
            ]
        );
    }

    #[tokio::test]
    async fn test_r282_rewrites_only_semicolon_lists() {
        let mut db = FakeDatabase::new().with_rows(
            RESELLER_IPS,
            vec![
                Row::new([("reseller_id", Some("2")), ("reseller_ips", Some("1;3;"))]),
                Row::new([("reseller_id", Some("3")), ("reseller_ips", Some("1,3"))]),
            ],
        );
        let mut config = MemoryConfigStore::new();
        let settings = SystemSettings::default();
        let mut ctx = StepContext {
            revision: 282,
            db: &mut db,
            config: &mut config,
            settings: &settings,
        };

        let result = r282(&mut ctx).await.unwrap();

        assert_eq!(
            result.statements(),
            ["UPDATE reseller_props SET reseller_ips = '1,3' WHERE reseller_id = '2'"]
        );
    }

    #[tokio::test]
    async fn test_r286_re_adds_support_system_flag() {
        let mut db = FakeDatabase::new().with_table(
            "reseller_props",
            &[
                "reseller_id",
                "support_system",
                "php_ini_system",
                "php_ini_al_config_level",
                "cgi",
            ],
        );
        let mut config = MemoryConfigStore::new();
        let settings = SystemSettings::default();
        let mut ctx = StepContext {
            revision: 286,
            db: &mut db,
            config: &mut config,
            settings: &settings,
        };

        let result = r286(&mut ctx).await.unwrap();
        let statements = result.statements();

        assert_eq!(db.executed(), ["ALTER TABLE `reseller_props` DROP `support_system`"]);
        assert!(statements.contains(
            &"ALTER TABLE `reseller_props` ADD `support_system` tinyint(1) NOT NULL DEFAULT '0'"
                .to_string()
        ));
        // Existing flags are not added twice
        assert!(!statements.iter().any(|s| s.contains("ADD `cgi`")));
        assert!(statements.iter().all(|s| !s.ends_with(',')));
    }

    #[tokio::test]
    async fn test_r284_renames_alias_table_once() {
        let mut db = FakeDatabase::new().with_table("domain_aliases", &["alias_id"]);
        let mut config = MemoryConfigStore::new();
        let settings = SystemSettings::default();
        let mut ctx = StepContext {
            revision: 284,
            db: &mut db,
            config: &mut config,
            settings: &settings,
        };

        assert_eq!(r284(&mut ctx).await.unwrap(), StepResult::NoOp);
    }
}
