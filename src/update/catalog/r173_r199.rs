//! Updates r173 to r199: the 1.1.x to 1.2.x schema.

use super::unset_config_keys;
use crate::schema::render::escape_string;
use crate::schema::IndexKind;
use crate::update::error::StepError;
use crate::update::step::{Step, StepContext, StepFuture, StepResult};
use tracing::warn;

pub(super) fn steps() -> Vec<Step> {
    vec![
        Step::new(173, "Refuse upgrades from releases older than 1.1.0", r173),
        Step::new(174, "Remove domain.domain_created_id", r174),
        Step::new(176, "Update sql_database and sql_user structure", r176),
        Step::new(177, "Fix SQL user hosts", r177),
        Step::new(178, "Drop passphrases from SSL private keys", r178),
        Step::new(179, "Remove ssl_certs.password", r179),
        Step::new(180, "Rename ssl_certs.id to domain_id", r180),
        Step::new(181, "Rename ssl_certs.type to domain_type", r181),
        Step::new(182, "Rename ssl_certs.key to private_key", r182),
        Step::new(183, "Rename ssl_certs.cert to certificate", r183),
        Step::new(184, "Rename ssl_certs.ca_cert to ca_bundle", r184),
        Step::new(185, "Drop ssl_certs index id", r185),
        Step::new(186, "Add ssl_certs domain_id_domain_type index", r186),
        Step::new(189, "Normalize SSL certificates", r189),
        Step::new(190, "Remove WEB_FOLDER_PROTECTION parameter", r190),
        Step::new(191, "Add mail_users.po_active", r191),
        Step::new(192, "Remove mail_users password prefix", r192),
        Step::new(193, "Index mail_users mail_addr, status and po_active", r193),
        Step::new(194, "Add plugin.plugin_priority", r194),
        Step::new(195, "Remove MAIL_WRITER_EXPIRY_TIME parameter", r195),
        Step::new(196, "Remove MAIL_BODY_FOOTPRINTS parameter", r196),
        Step::new(198, "Remove postgrey and policyd-weight ports", r198),
        Step::new(199, "Add domain_dns.domain_dns_status", r199),
    ]
}

const SQL_USERS: &str = "SELECT DISTINCT sqlu_name FROM sql_user";
const SSL_KEYS: &str = "SELECT cert_id, password, `key` FROM ssl_certs";
const SSL_CERTS: &str = "SELECT cert_id, private_key, certificate, ca_bundle FROM ssl_certs";

fn r173<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Err(StepError::unsupported(
            "Upgrade support for versions older than 1.1.0 has been removed. \
             You must first upgrade to version 1.3.8, then upgrade to this newest version.",
        ))
    })
}

fn r174<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .drop_column("domain", "domain_created_id")
            .await?
            .into())
    })
}

fn r176<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        let utf8 = "CHARACTER SET utf8 COLLATE utf8_unicode_ci";

        Ok(StepResult::from_statements([
            Some(schema.change_column(
                "sql_database",
                "domain_id",
                "domain_id INT(10) UNSIGNED NOT NULL",
            )),
            Some(schema.change_column(
                "sql_database",
                "sqld_name",
                &format!("sqld_name VARCHAR(64) {utf8} NOT NULL"),
            )),
            Some(schema.change_column("sql_user", "sqld_id", "sqld_id INT(10) UNSIGNED NOT NULL")),
            Some(schema.change_column(
                "sql_user",
                "sqlu_name",
                &format!("sqlu_name VARCHAR(16) {utf8} NOT NULL"),
            )),
            Some(schema.change_column(
                "sql_user",
                "sqlu_pass",
                &format!("sqlu_pass VARCHAR(64) {utf8} NOT NULL"),
            )),
            schema
                .add_column(
                    "sql_user",
                    "sqlu_host",
                    &format!("VARCHAR(255) {utf8} NOT NULL AFTER sqlu_name"),
                )
                .await?,
            schema
                .add_index("sql_user", &["sqlu_name"], IndexKind::Index, Some("sqlu_name"))
                .await?,
            schema
                .add_index("sql_user", &["sqlu_host"], IndexKind::Index, Some("sqlu_host"))
                .await?,
        ]))
    })
}

/// Move every panel SQL user to the configured user host
fn r177<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let host = match ctx.settings.require("DATABASE_USER_HOST")? {
            "127.0.0.1" => "localhost",
            host => host,
        };
        let host = escape_string(host);

        let users = ctx.db.fetch_all(SQL_USERS, &[]).await?;
        if users.is_empty() {
            return Ok(StepResult::NoOp);
        }

        let mut statements = Vec::with_capacity(users.len() * 3 + 1);
        for row in &users {
            let user = escape_string(row.require("sqlu_name")?);
            statements.push(format!(
                "UPDATE IGNORE mysql.user SET Host = {host} WHERE User = {user} AND Host NOT IN ({host}, '%')"
            ));
            statements.push(format!(
                "UPDATE IGNORE mysql.db SET Host = {host} WHERE User = {user} AND Host NOT IN ({host}, '%')"
            ));
            statements.push(format!(
                "UPDATE sql_user SET sqlu_host = {host} WHERE sqlu_name = {user} AND sqlu_host NOT IN ({host}, '%')"
            ));
        }
        statements.push("FLUSH PRIVILEGES".to_string());

        Ok(statements.into())
    })
}

/// Private keys must be stored unencrypted from here on. Keys that are not a
/// PKCS#1 PEM block cannot be loaded and their certificates are removed.
/// Passphrase-protected keys cannot be decrypted here, so the update refuses
/// to continue until they are re-imported without a passphrase.
fn r178<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        if !ctx.schema().introspector().column_exists("ssl_certs", "password").await? {
            return Ok(StepResult::NoOp);
        }

        let rows = ctx.db.fetch_all(SSL_KEYS, &[]).await?;
        let mut encrypted = Vec::new();
        let mut statements = Vec::new();
        for row in &rows {
            let cert_id = row.require("cert_id")?;
            if row.get("password").is_some_and(|p| !p.is_empty()) {
                encrypted.push(cert_id.to_string());
            } else if !is_plain_pkcs1_key(row.get("key").unwrap_or_default()) {
                warn!("Removing SSL certificate {} with an unreadable private key", cert_id);
                statements.push(format!(
                    "DELETE FROM ssl_certs WHERE cert_id = {}",
                    escape_string(cert_id)
                ));
            }
        }

        if !encrypted.is_empty() {
            return Err(StepError::unsupported(format!(
                "SSL private keys of certificates {} are protected by a passphrase. \
                 Re-import them without a passphrase, then run the update again.",
                encrypted.join(", ")
            )));
        }

        Ok(statements.into())
    })
}

/// Unencrypted RSA key in a PKCS#1 (or unencrypted PKCS#8) PEM block
fn is_plain_pkcs1_key(key: &str) -> bool {
    let key = key.trim();
    let framed = |label: &str| {
        key.starts_with(&format!("-----BEGIN {label}-----"))
            && key.ends_with(&format!("-----END {label}-----"))
    };

    (framed("RSA PRIVATE KEY") || framed("PRIVATE KEY")) && !key.contains("ENCRYPTED")
}

fn r179<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { Ok(ctx.schema().drop_column("ssl_certs", "password").await?.into()) })
}

fn r180<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column("ssl_certs", "id", "domain_id INT(10) NOT NULL")
            .into())
    })
}

fn r181<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column(
                "ssl_certs",
                "type",
                "domain_type ENUM('dmn','als','sub','alssub') CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL DEFAULT 'dmn'",
            )
            .into())
    })
}

fn r182<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column(
                "ssl_certs",
                "key",
                "private_key TEXT CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL",
            )
            .into())
    })
}

fn r183<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column(
                "ssl_certs",
                "cert",
                "certificate TEXT CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL",
            )
            .into())
    })
}

fn r184<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column(
                "ssl_certs",
                "ca_cert",
                "ca_bundle TEXT CHARACTER SET utf8 COLLATE utf8_unicode_ci NULL DEFAULT NULL",
            )
            .into())
    })
}

fn r185<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { Ok(ctx.schema().drop_index_by_name("ssl_certs", "id").await?.into()) })
}

fn r186<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .add_index(
                "ssl_certs",
                &["domain_id", "domain_type"],
                IndexKind::Unique,
                Some("domain_id_domain_type"),
            )
            .await?
            .into())
    })
}

/// Trim surrounding whitespace and use Unix line endings
fn normalize_pem(value: &str) -> String {
    value.trim().replace("\r\n", "\n")
}

fn r189<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let certs = ctx.db.fetch_all(SSL_CERTS, &[]).await?;

        let mut statements = Vec::with_capacity(certs.len());
        for row in &certs {
            let private_key = normalize_pem(row.get("private_key").unwrap_or_default()) + "\n";
            let certificate = normalize_pem(row.get("certificate").unwrap_or_default()) + "\n";
            let ca_bundle = normalize_pem(row.get("ca_bundle").unwrap_or_default());

            statements.push(format!(
                "UPDATE ssl_certs SET private_key = {}, certificate = {}, ca_bundle = {} WHERE cert_id = {}",
                escape_string(&private_key),
                escape_string(&certificate),
                escape_string(&ca_bundle),
                escape_string(row.require("cert_id")?)
            ));
        }

        Ok(statements.into())
    })
}

fn r190<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { unset_config_keys(ctx, &["WEB_FOLDER_PROTECTION"]).await })
}

fn r191<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .add_column(
                "mail_users",
                "po_active",
                "VARCHAR(3) COLLATE utf8_unicode_ci NOT NULL DEFAULT 'yes' AFTER status",
            )
            .await?
            .into())
    })
}

fn r192<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok("UPDATE mail_users SET mail_pass = SUBSTRING(mail_pass, 4), po_active = 'no' \
            WHERE mail_pass <> '_no_' AND status = 'disabled'"
            .into())
    })
}

fn r193<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        let mut statements = Vec::new();
        for column in ["mail_addr", "status", "po_active"] {
            statements.push(
                schema
                    .add_index("mail_users", &[column], IndexKind::Index, Some(column))
                    .await?,
            );
        }
        Ok(StepResult::from_statements(statements))
    })
}

fn r194<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        Ok(StepResult::from_statements([
            schema
                .add_column(
                    "plugin",
                    "plugin_priority",
                    "INT(11) UNSIGNED NOT NULL DEFAULT '0' AFTER plugin_config",
                )
                .await?,
            schema
                .add_index(
                    "plugin",
                    &["plugin_priority"],
                    IndexKind::Index,
                    Some("plugin_priority"),
                )
                .await?,
        ]))
    })
}

fn r195<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { unset_config_keys(ctx, &["MAIL_WRITER_EXPIRY_TIME"]).await })
}

fn r196<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { unset_config_keys(ctx, &["MAIL_BODY_FOOTPRINTS"]).await })
}

fn r198<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { unset_config_keys(ctx, &["PORT_POSTGREY", "PORT_POLICYD-WEIGHT"]).await })
}

fn r199<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .add_column(
                "domain_dns",
                "domain_dns_status",
                "VARCHAR(255) CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL DEFAULT 'ok'",
            )
            .await?
            .into())
    })
}
