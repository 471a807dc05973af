//! Updates r200 to r239: PHP editor levels, HSTS, forwarding and traffic schema.

use crate::schema::IndexKind;
use crate::schema::render::escape_string;
use crate::update::step::{Step, StepContext, StepFuture, StepResult};
use anyhow::Context;
use tracing::{debug, info, warn};
use url::{Host, Url};

pub(super) fn steps() -> Vec<Step> {
    vec![
        Step::new(200, "Add plugin.plugin_config_prev", r200),
        Step::new(201, "Fix plugin.plugin_config_prev type", r201),
        Step::new(203, "Widen domain.allowbackup for the backup feature", r203),
        Step::new(206, "Add plugin.plugin_locked", r206),
        Step::new(208, "Drop server_traffic index traff_time", r208),
        Step::new(211, "Add PHP editor levels to php_ini", r211),
        Step::new(212, "Make the PHP mail function disableable", r212),
        Step::new(213, "Delete administrator-level PHP editor options", r213),
        Step::new(214, "Update php_ini.error_reporting default", r214),
        Step::new(217, "Add ftp_users.status", r217),
        Step::new(218, "Default external_mail_dns_ids to empty", r218),
        Step::new(219, "Add SPF custom DNS record type", r219),
        Step::new(220, "Drop domain_dns index domain_id", r220),
        Step::new(221, "Store custom DNS data as TEXT", r221),
        Step::new(222, "Convert FTP users and groups to ACE form", r222),
        Step::new(223, "Fix LOG_LEVEL value", r223),
        Step::new(224, "Add ssl_certs.allow_hsts", r224),
        Step::new(225, "Add forward type columns", r225),
        Step::new(226, "Add missing URL path separator to redirects", r226),
        Step::new(227, "Add HSTS options", r227),
        Step::new(228, "Reset mail templates", r228),
        Step::new(229, "Index mail_users.sub_id", r229),
        Step::new(230, "Reset external mail feature", r230),
        Step::new(231, "Add server_ips.ip_config_mode", r231),
        Step::new(232, "Set manual configuration mode for the primary IP", r232),
        Step::new(233, "Create missing php_ini entries", r233),
        Step::new(235, "Make primary domains forwardable", r235),
        Step::new(236, "Remove ftp URL redirects", r236),
        Step::new(238, "Update domain_traffic structure", r238),
        Step::new(239, "Drop monthly_domain_traffic view", r239),
    ]
}

const FTP_USERS: &str = "SELECT userid FROM ftp_users";
const FTP_GROUPS: &str = "SELECT groupname, members FROM ftp_group";

fn r200<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let add = ctx
            .schema()
            .add_column(
                "plugin",
                "plugin_config_prev",
                "VARCHAR(255) CHARACTER SET utf8 COLLATE utf8_unicode_ci DEFAULT NULL AFTER plugin_config",
            )
            .await?;

        // Only seed the copy when the column is new
        Ok(match add {
            Some(add) => vec![
                add,
                "UPDATE plugin SET plugin_config_prev = plugin_config".to_string(),
            ]
            .into(),
            None => StepResult::NoOp,
        })
    })
}

fn r201<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(vec![
            ctx.schema().change_column(
                "plugin",
                "plugin_config_prev",
                "plugin_config_prev TEXT CHARACTER SET utf8 COLLATE utf8_unicode_ci NULL DEFAULT NULL",
            ),
            "UPDATE plugin SET plugin_config_prev = plugin_config".to_string(),
        ]
        .into())
    })
}

fn r203<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(vec![
            ctx.schema().change_column(
                "domain",
                "allowbackup",
                "allowbackup varchar(12) COLLATE utf8_unicode_ci NOT NULL DEFAULT 'dmn|sql|mail'",
            ),
            "UPDATE domain SET allowbackup = REPLACE(allowbackup, 'full', 'dmn|sql|mail')".to_string(),
            "UPDATE domain SET allowbackup = REPLACE(allowbackup, 'no', '')".to_string(),
        ]
        .into())
    })
}

fn r206<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .add_column("plugin", "plugin_locked", "TINYINT UNSIGNED NOT NULL DEFAULT '0'")
            .await?
            .into())
    })
}

fn r208<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .drop_index_by_name("server_traffic", "traff_time")
            .await?
            .into())
    })
}

fn r211<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        let mut statements = vec![
            schema
                .add_column("php_ini", "admin_id", "INT(10) NOT NULL AFTER `id`")
                .await?,
            schema
                .add_column(
                    "php_ini",
                    "domain_type",
                    "VARCHAR(15) CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL DEFAULT 'dmn' AFTER `domain_id`",
                )
                .await?,
        ];
        for column in ["admin_id", "domain_id", "domain_type"] {
            statements.push(schema.add_index("php_ini", &[column], IndexKind::Key, None).await?);
        }
        statements.push(Some(
            "UPDATE php_ini JOIN domain USING(domain_id) SET admin_id = domain_admin_id WHERE domain_type = 'dmn'"
                .to_string(),
        ));

        Ok(StepResult::from_statements(statements))
    })
}

fn r212<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        Ok(StepResult::from_statements([
            schema
                .add_column(
                    "reseller_props",
                    "php_ini_al_mail_function",
                    "VARCHAR(15) NOT NULL DEFAULT 'yes' AFTER `php_ini_al_disable_functions`",
                )
                .await?,
            schema
                .add_column(
                    "domain",
                    "phpini_perm_mail_function",
                    "VARCHAR(20) NOT NULL DEFAULT 'yes' AFTER `phpini_perm_disable_functions`",
                )
                .await?,
        ]))
    })
}

fn r213<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let removed = ctx.config.unset_matching("PHPINI_").await?;
        if removed > 0 {
            info!("Removed {} PHPINI_* parameter(s)", removed);
        }
        Ok(StepResult::NoOp)
    })
}

fn r214<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column(
                "php_ini",
                "error_reporting",
                "error_reporting VARCHAR(255) CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL \
                 DEFAULT 'E_ALL & ~E_DEPRECATED & ~E_STRICT'",
            )
            .into())
    })
}

fn r217<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .add_column(
                "ftp_users",
                "status",
                "varchar(255) collate utf8_unicode_ci NOT NULL DEFAULT 'ok'",
            )
            .await?
            .into())
    })
}

fn r218<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let schema = ctx.schema();
        let definition =
            "external_mail_dns_ids VARCHAR(255) CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL DEFAULT ''";
        Ok(vec![
            schema.change_column("domain", "external_mail_dns_ids", definition),
            schema.change_column("domain_aliasses", "external_mail_dns_ids", definition),
        ]
        .into())
    })
}

fn r219<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column(
                "domain_dns",
                "domain_type",
                "`domain_type` ENUM(\
                 'A','AAAA','CERT','CNAME','DNAME','GPOS','KEY','KX','MX','NAPTR','NSAP','NS','NXT','PTR','PX','SIG',\
                 'SRV','TXT','SPF'\
                 ) CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL DEFAULT 'A'",
            )
            .into())
    })
}

fn r220<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .drop_index_by_name("domain_dns", "domain_id")
            .await?
            .into())
    })
}

fn r221<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        Ok(StepResult::from_statements([
            Some(schema.change_column(
                "domain_dns",
                "domain_dns",
                "`domain_dns` TEXT CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL",
            )),
            Some(schema.change_column(
                "domain_dns",
                "domain_text",
                "`domain_text` TEXT CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL",
            )),
            schema
                .add_index(
                    "domain_dns",
                    &[
                        "domain_id",
                        "alias_id",
                        "domain_dns(255)",
                        "domain_class",
                        "domain_type",
                        "domain_text(255)",
                    ],
                    IndexKind::Unique,
                    None,
                )
                .await?,
        ]))
    })
}

/// ACE form of a name or of the domain part of an `account@domain` name.
/// ASCII input is returned untouched.
fn to_ace(value: &str) -> anyhow::Result<String> {
    if value.is_ascii() {
        return Ok(value.to_string());
    }

    let (local, domain) = match value.rsplit_once('@') {
        Some((local, domain)) => (Some(local), domain),
        None => (None, value),
    };
    let host = Host::parse(domain)
        .with_context(|| format!("Cannot convert '{}' to ACE form", value))?;
    let ace = match host {
        Host::Domain(domain) => domain,
        other => other.to_string(),
    };

    Ok(match local {
        Some(local) => format!("{}@{}", local, ace),
        None => ace,
    })
}

fn r222<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let users = ctx.db.fetch_all(FTP_USERS, &[]).await?;
        for row in &users {
            let userid = row.require("userid")?;
            let ace = to_ace(userid)?;
            if ace != userid {
                ctx.db
                    .execute_with(
                        "UPDATE ftp_users SET userid = ? WHERE userid = ?",
                        &[ace.as_str(), userid],
                    )
                    .await?;
            }
        }

        let groups = ctx.db.fetch_all(FTP_GROUPS, &[]).await?;
        for row in &groups {
            let groupname = row.require("groupname")?;
            let members = row
                .get("members")
                .unwrap_or_default()
                .split(',')
                .map(to_ace)
                .collect::<anyhow::Result<Vec<_>>>()?
                .join(",");
            let ace = to_ace(groupname)?;

            ctx.db
                .execute_with(
                    "UPDATE ftp_group SET groupname = ?, members = ? WHERE groupname = ?",
                    &[ace.as_str(), members.as_str(), groupname],
                )
                .await?;
        }

        Ok(StepResult::NoOp)
    })
}

/// Numeric value of a PHP user error level name
fn log_level_value(name: &str) -> u32 {
    match name {
        "E_USER_ERROR" => 256,
        "E_USER_WARNING" => 512,
        "E_USER_NOTICE" => 1024,
        "E_USER_DEPRECATED" => 16384,
        _ => 256,
    }
}

fn r223<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let level = ctx.config.get("LOG_LEVEL").await?;
        if let Some(level) = level
            && level.chars().any(|c| !c.is_ascii_digit())
        {
            let value = log_level_value(level.trim()).to_string();
            debug!("Rewriting LOG_LEVEL '{}' as {}", level, value);
            ctx.config.set("LOG_LEVEL", &value).await?;
        }

        Ok(StepResult::NoOp)
    })
}

fn r224<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .add_column(
                "ssl_certs",
                "allow_hsts",
                "VARCHAR(10) COLLATE utf8_unicode_ci NOT NULL DEFAULT 'off' AFTER ca_bundle",
            )
            .await?
            .into())
    })
}

fn r225<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        let mut statements = Vec::new();

        for (table, prefix) in [
            ("domain_aliasses", ""),
            ("subdomain", "subdomain_"),
            ("subdomain_alias", "subdomain_alias_"),
        ] {
            let column = format!("{prefix}type_forward");
            let add = schema
                .add_column(
                    table,
                    &column,
                    &format!(
                        "VARCHAR(5) COLLATE utf8_unicode_ci DEFAULT NULL AFTER {prefix}url_forward"
                    ),
                )
                .await?;

            if let Some(add) = add {
                statements.push(add);
                statements.push(format!(
                    "UPDATE {table} SET {column} = '302' WHERE {prefix}url_forward <> 'no'"
                ));
            }
        }

        Ok(statements.into())
    })
}

/// Collapse repeated slashes in the URL path and make it end with one
fn normalize_forward_url(value: &str) -> anyhow::Result<String> {
    let mut url = Url::parse(value).with_context(|| format!("Invalid redirect URL '{}'", value))?;

    let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    let path = if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    };
    url.set_path(&path);

    Ok(url.to_string())
}

/// Tables holding redirect URLs: table, id column, URL column
const FORWARD_COLUMNS: [(&str, &str, &str); 3] = [
    ("domain_aliasses", "alias_id", "url_forward"),
    ("subdomain", "subdomain_id", "subdomain_url_forward"),
    ("subdomain_alias", "subdomain_alias_id", "subdomain_alias_url_forward"),
];

fn r226<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        for (table, id_column, url_column) in FORWARD_COLUMNS {
            let select =
                format!("SELECT {id_column}, {url_column} FROM {table} WHERE {url_column} <> 'no'");
            let update = format!("UPDATE {table} SET {url_column} = ? WHERE {id_column} = ?");

            let rows = ctx.db.fetch_all(&select, &[]).await?;
            for row in &rows {
                let current = row.require(url_column)?;
                let normalized = match normalize_forward_url(current) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!("Leaving {} unchanged: {:#}", table, e);
                        continue;
                    }
                };

                if normalized != current {
                    ctx.db
                        .execute_with(&update, &[normalized.as_str(), row.require(id_column)?])
                        .await?;
                }
            }
        }

        Ok(StepResult::NoOp)
    })
}

fn r227<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        Ok(StepResult::from_statements([
            schema
                .add_column(
                    "ssl_certs",
                    "hsts_max_age",
                    "int(11) NOT NULL DEFAULT '31536000' AFTER allow_hsts",
                )
                .await?,
            schema
                .add_column(
                    "ssl_certs",
                    "hsts_include_subdomains",
                    "VARCHAR(10) COLLATE utf8_unicode_ci NOT NULL DEFAULT 'off' AFTER hsts_max_age",
                )
                .await?,
        ]))
    })
}

fn r228<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { Ok("TRUNCATE email_tpls".into()) })
}

fn r229<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .add_index("mail_users", &["sub_id"], IndexKind::Index, None)
            .await?
            .into())
    })
}

fn r230<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        Ok(StepResult::from_statements([
            schema.drop_column("domain", "external_mail_dns_ids").await?,
            schema.drop_column("domain_aliasses", "external_mail_dns_ids").await?,
            Some("DELETE FROM domain_dns WHERE owned_by = 'ext_mail_feature'".to_string()),
            Some("UPDATE domain_aliasses SET external_mail = 'off'".to_string()),
            Some("UPDATE domain SET external_mail = 'off'".to_string()),
        ]))
    })
}

fn r231<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .add_column(
                "server_ips",
                "ip_config_mode",
                "VARCHAR(15) COLLATE utf8_unicode_ci DEFAULT 'auto' AFTER ip_card",
            )
            .await?
            .into())
    })
}

fn r232<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let primary_ip = escape_string(ctx.settings.require("BASE_SERVER_IP")?);
        Ok(format!(
            "UPDATE server_ips SET ip_config_mode = 'manual' WHERE ip_number = {primary_ip}"
        )
        .into())
    })
}

/// Sources of php_ini entries: domain type, admin and id expressions, joins, live-entity condition
const PHP_INI_OWNERS: [(&str, &str, &str, &str); 4] = [
    (
        "dmn",
        "d.domain_id",
        "domain d",
        "d.domain_status <> 'todelete'",
    ),
    (
        "sub",
        "s.subdomain_id",
        "subdomain s JOIN domain d ON d.domain_id = s.domain_id",
        "s.subdomain_status <> 'todelete'",
    ),
    (
        "als",
        "a.alias_id",
        "domain_aliasses a JOIN domain d ON d.domain_id = a.domain_id",
        "a.alias_status <> 'todelete'",
    ),
    (
        "subals",
        "sa.subdomain_alias_id",
        "subdomain_alias sa JOIN domain_aliasses a ON a.alias_id = sa.alias_id \
         JOIN domain d ON d.domain_id = a.domain_id",
        "sa.subdomain_alias_status <> 'todelete'",
    ),
];

/// One php_ini entry (column defaults) for every live domain, subdomain and alias lacking one
fn r233<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let statements: Vec<String> = PHP_INI_OWNERS
            .iter()
            .map(|(domain_type, id, from, live)| {
                format!(
                    "INSERT INTO php_ini (admin_id, domain_id, domain_type) \
                     SELECT d.domain_admin_id, {id}, '{domain_type}' FROM {from} \
                     JOIN admin c ON c.admin_id = d.domain_admin_id \
                     JOIN admin r ON r.admin_id = c.created_by AND r.admin_type = 'reseller' \
                     WHERE {live} AND NOT EXISTS (\
                     SELECT 1 FROM php_ini p WHERE p.admin_id = d.domain_admin_id \
                     AND p.domain_id = {id} AND p.domain_type = '{domain_type}')"
                )
            })
            .collect();

        Ok(statements.into())
    })
}

fn r235<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        let host_forward = "VARCHAR(3) COLLATE utf8_unicode_ci DEFAULT 'Off'";

        Ok(StepResult::from_statements([
            schema
                .add_column(
                    "domain",
                    "url_forward",
                    "VARCHAR(255) COLLATE utf8_unicode_ci NOT NULL DEFAULT 'no'",
                )
                .await?,
            schema
                .add_column(
                    "domain",
                    "type_forward",
                    "VARCHAR(5) COLLATE utf8_unicode_ci DEFAULT NULL",
                )
                .await?,
            schema.add_column("domain", "host_forward", host_forward).await?,
            schema
                .add_column(
                    "domain_aliasses",
                    "host_forward",
                    &format!("{host_forward} AFTER type_forward"),
                )
                .await?,
            schema
                .add_column(
                    "subdomain",
                    "subdomain_host_forward",
                    &format!("{host_forward} AFTER subdomain_type_forward"),
                )
                .await?,
            schema
                .add_column(
                    "subdomain_alias",
                    "subdomain_alias_host_forward",
                    &format!("{host_forward} AFTER subdomain_alias_type_forward"),
                )
                .await?,
        ]))
    })
}

fn r236<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let statements: Vec<String> = FORWARD_COLUMNS
            .iter()
            .map(|(table, _, url_column)| {
                let type_column = url_column.replace("url_forward", "type_forward");
                format!(
                    "UPDATE {table} SET {url_column} = 'no', {type_column} = NULL WHERE {url_column} LIKE 'ftp://%'"
                )
            })
            .collect();
        Ok(statements.into())
    })
}

fn r238<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok("ALTER TABLE `domain_traffic` \
            CHANGE `domain_id` `domain_id` INT(10) UNSIGNED NOT NULL, \
            CHANGE `dtraff_time` `dtraff_time` BIGINT(20) UNSIGNED NOT NULL, \
            CHANGE `dtraff_web` `dtraff_web` BIGINT(20) UNSIGNED NULL DEFAULT '0', \
            CHANGE `dtraff_ftp` `dtraff_ftp` BIGINT(20) UNSIGNED NULL DEFAULT '0', \
            CHANGE `dtraff_mail` `dtraff_mail` BIGINT(20) UNSIGNED NULL DEFAULT '0', \
            CHANGE `dtraff_pop` `dtraff_pop` BIGINT(20) UNSIGNED NULL DEFAULT '0'"
            .into())
    })
}

fn r239<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { Ok("DROP VIEW IF EXISTS monthly_domain_traffic".into()) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemSettings;
    use crate::db::Row;
    use crate::db::testing::{FakeDatabase, MemoryConfigStore};
    use crate::update::error::StepError;
    use crate::update::step::StepFn;
    use rstest::rstest;

    async fn apply(
        step: StepFn,
        db: &mut FakeDatabase,
        config: &mut MemoryConfigStore,
    ) -> Result<StepResult, StepError> {
        let settings = SystemSettings::default();
        let mut ctx = StepContext {
            revision: 0,
            db,
            config,
            settings: &settings,
        };
        step(&mut ctx).await
    }

    #[rstest]
    #[case("E_USER_ERROR", "256")]
    #[case("E_USER_WARNING", "512")]
    #[case("E_USER_NOTICE", "1024")]
    #[case("E_USER_DEPRECATED", "16384")]
    #[case("E_SOMETHING_ELSE", "256")]
    #[tokio::test]
    async fn test_r223_rewrites_named_log_levels(#[case] name: &str, #[case] expected: &str) {
        let mut db = FakeDatabase::new();
        let mut config = MemoryConfigStore::new().with("LOG_LEVEL", name);

        apply(r223, &mut db, &mut config).await.unwrap();

        assert_eq!(config.value("LOG_LEVEL"), Some(expected));
    }

    #[tokio::test]
    async fn test_r223_keeps_numeric_log_level() {
        let mut db = FakeDatabase::new();
        let mut config = MemoryConfigStore::new().with("LOG_LEVEL", "1024");

        apply(r223, &mut db, &mut config).await.unwrap();

        assert_eq!(config.value("LOG_LEVEL"), Some("1024"));
    }

    #[tokio::test]
    async fn test_r213_removes_php_editor_keys_through_store() {
        let mut db = FakeDatabase::new();
        let mut config = MemoryConfigStore::new()
            .with("PHPINI_ALLOW_URL_FOPEN", "off")
            .with("PHPINI_MEMORY_LIMIT", "128")
            .with("PHP_FPM_POOLS_LEVEL", "per_site");

        let result = apply(r213, &mut db, &mut config).await.unwrap();

        assert_eq!(result, StepResult::NoOp);
        assert!(db.executed().is_empty());
        assert_eq!(config.value("PHPINI_ALLOW_URL_FOPEN"), None);
        assert_eq!(config.value("PHPINI_MEMORY_LIMIT"), None);
        assert_eq!(config.value("PHP_FPM_POOLS_LEVEL"), Some("per_site"));
    }

    #[test]
    fn test_to_ace() {
        assert_eq!(to_ace("john@example.com").unwrap(), "john@example.com");
        assert_eq!(to_ace("bücher.de").unwrap(), "xn--bcher-kva.de");
        assert_eq!(to_ace("jörg@bücher.de").unwrap(), "jörg@xn--bcher-kva.de");
    }

    #[test]
    fn test_normalize_forward_url() {
        assert_eq!(
            normalize_forward_url("http://example.com").unwrap(),
            "http://example.com/"
        );
        assert_eq!(
            normalize_forward_url("https://example.com//shop//cart?id=1").unwrap(),
            "https://example.com/shop/cart/?id=1"
        );
        assert!(normalize_forward_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_r222_updates_only_non_ascii_users() {
        let mut db = FakeDatabase::new()
            .with_rows(
                FTP_USERS,
                vec![
                    Row::new([("userid", Some("john@example.com"))]),
                    Row::new([("userid", Some("jane@bücher.de"))]),
                ],
            )
            .with_rows(
                FTP_GROUPS,
                vec![Row::new([
                    ("groupname", Some("bücher.de")),
                    ("members", Some("jane@bücher.de,bob@bücher.de")),
                ])],
            );
        let mut config = MemoryConfigStore::new();

        let result = apply(r222, &mut db, &mut config).await.unwrap();

        assert_eq!(result, StepResult::NoOp);
        assert_eq!(
            db.executed(),
            [
                "UPDATE ftp_users SET userid = ? WHERE userid = ?",
                "UPDATE ftp_group SET groupname = ?, members = ? WHERE groupname = ?",
            ]
        );
    }

    #[tokio::test]
    async fn test_r225_seeds_type_only_for_new_columns() {
        let mut db = FakeDatabase::new()
            .with_table("domain_aliasses", &["alias_id", "url_forward", "type_forward"])
            .with_table("subdomain", &["subdomain_id", "subdomain_url_forward"])
            .with_table("subdomain_alias", &["subdomain_alias_id", "subdomain_alias_url_forward"]);
        let mut config = MemoryConfigStore::new();

        let result = apply(r225, &mut db, &mut config).await.unwrap();

        assert_eq!(result.statements().len(), 4);
        assert_eq!(
            result.statements()[1],
            "UPDATE subdomain SET subdomain_type_forward = '302' WHERE subdomain_url_forward <> 'no'"
        );
    }

    #[tokio::test]
    async fn test_r233_covers_every_domain_type() {
        let mut db = FakeDatabase::new();
        let mut config = MemoryConfigStore::new();

        let result = apply(r233, &mut db, &mut config).await.unwrap();

        let statements = result.statements();
        assert_eq!(statements.len(), 4);
        for domain_type in ["'dmn'", "'sub'", "'als'", "'subals'"] {
            assert!(statements.iter().any(|s| s.contains(domain_type)));
        }
    }

    #[tokio::test]
    async fn test_r236_clears_ftp_redirects() {
        let mut db = FakeDatabase::new();
        let mut config = MemoryConfigStore::new();

        let result = apply(r236, &mut db, &mut config).await.unwrap();

        assert_eq!(
            result.statements()[2],
            "UPDATE subdomain_alias SET subdomain_alias_url_forward = 'no', subdomain_alias_type_forward = NULL \
             WHERE subdomain_alias_url_forward LIKE 'ftp://%'"
        );
    }

    #[tokio::test]
    async fn test_r232_requires_base_server_ip() {
        let mut db = FakeDatabase::new();
        let mut config = MemoryConfigStore::new();

        let err = apply(r232, &mut db, &mut config).await.unwrap_err();
        assert!(err.to_string().contains("BASE_SERVER_IP"));
    }
}
