//! Updates r241 to r259: netmasks, document roots, password schemes and cleanups.

use super::unset_config_keys;
use crate::update::step::{Step, StepContext, StepFuture, StepResult};

pub(super) fn steps() -> Vec<Step> {
    vec![
        Step::new(241, "Delete AWStats statistics group", r241),
        Step::new(242, "Add server_ips.ip_netmask", r242),
        Step::new(243, "Populate server_ips.ip_netmask", r243),
        Step::new(244, "Rename plugin.plugin_locked to plugin_lockers", r244),
        Step::new(245, "Add alternative document root columns", r245),
        Step::new(246, "Drop ftp_users.rawpasswd", r246),
        Step::new(247, "Drop sql_user.sqlu_pass", r247),
        Step::new(248, "Widen mail_users.mail_pass", r248),
        Step::new(249, "Store mail passwords as SHA512-crypt", r249),
        Step::new(250, "Widen server_ips.ip_number for IPv6", r250),
        Step::new(251, "Delete invalid default mail accounts", r251),
        Step::new(252, "Fix plugin.plugin_lockers value", r252),
        Step::new(253, "Store domain_dns.domain_dns_status as TEXT", r253),
        Step::new(254, "Remove mailboxes of the canonical mail domain", r254),
        Step::new(255, "Disable po_active for forward-only accounts", r255),
        Step::new(256, "Remove output compression parameters", r256),
        Step::new(257, "Update user_gui_props structure", r257),
        Step::new(258, "Remove orphaned subdomain alias php_ini entries", r258),
        Step::new(259, "Rebuild ftp_group members", r259),
    ]
}

const SERVER_IPS: &str = "SELECT ip_id, ip_number, ip_netmask FROM server_ips";
const CANONICAL_MAILBOXES: &str = "SELECT mail_id, mail_type FROM mail_users \
     WHERE mail_type LIKE '%_mail%' AND SUBSTRING(mail_addr, LOCATE('@', mail_addr) + 1) = ?";

fn r241<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { Ok("DELETE FROM htaccess_groups WHERE ugroup = 'statistics'".into()) })
}

fn r242<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .add_column(
                "server_ips",
                "ip_netmask",
                "TINYINT(1) UNSIGNED DEFAULT NULL AFTER ip_number",
            )
            .await?
            .into())
    })
}

/// Host netmask for an address: /64 for IPv6, /32 for IPv4
fn default_netmask(ip: &str) -> &'static str {
    if ip.contains(':') { "64" } else { "32" }
}

fn r243<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let primary_ip = ctx.settings.require("BASE_SERVER_IP")?;
        let addresses = ctx.db.fetch_all(SERVER_IPS, &[]).await?;

        for row in &addresses {
            let ip = row.require("ip_number")?;
            if ip == primary_ip || !row.is_null("ip_netmask") {
                continue;
            }

            ctx.db
                .execute_with(
                    "UPDATE server_ips SET ip_netmask = ? WHERE ip_id = ?",
                    &[default_netmask(ip), row.require("ip_id")?],
                )
                .await?;
        }

        Ok(StepResult::NoOp)
    })
}

fn r244<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(vec![
            "ALTER TABLE plugin CHANGE plugin_locked plugin_lockers TEXT CHARACTER SET utf8 COLLATE utf8_unicode_ci DEFAULT NULL"
                .to_string(),
            "UPDATE plugin SET plugin_lockers = '{}'".to_string(),
        ]
        .into())
    })
}

fn r245<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let mut schema = ctx.schema();
        let mut statements = Vec::new();

        for (table, column, after) in [
            ("domain", "document_root", "mail_quota"),
            ("subdomain", "subdomain_document_root", "subdomain_mount"),
            ("domain_aliasses", "alias_document_root", "alias_mount"),
            ("subdomain_alias", "subdomain_alias_document_root", "subdomain_alias_mount"),
        ] {
            statements.push(
                schema
                    .add_column(
                        table,
                        column,
                        &format!(
                            "varchar(255) collate utf8_unicode_ci NOT NULL DEFAULT '/htdocs' AFTER {after}"
                        ),
                    )
                    .await?,
            );
        }

        Ok(StepResult::from_statements(statements))
    })
}

fn r246<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { Ok(ctx.schema().drop_column("ftp_users", "rawpasswd").await?.into()) })
}

fn r247<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move { Ok(ctx.schema().drop_column("sql_user", "sqlu_pass").await?.into()) })
}

fn r248<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column(
                "mail_users",
                "mail_pass",
                "mail_pass varchar(255) collate utf8_unicode_ci NOT NULL DEFAULT '_no_'",
            )
            .into())
    })
}

/// Hash in the server with crypt(3) and a random 16 character salt.
/// Rows already in `$6$` form are left alone so the step is safe to repeat.
fn r249<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok("UPDATE mail_users \
            SET mail_pass = ENCRYPT(mail_pass, CONCAT('$6$', SUBSTRING(SHA2(RAND(), 256), 1, 16))) \
            WHERE mail_pass <> '_no_' AND mail_pass NOT LIKE '$6$%'"
            .into())
    })
}

fn r250<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column(
                "server_ips",
                "ip_number",
                "ip_number VARCHAR(45) CHARACTER SET utf8 COLLATE utf8_unicode_ci NULL DEFAULT NULL",
            )
            .into())
    })
}

fn r251<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok("DELETE FROM mail_users \
            WHERE mail_acc RLIKE '^abuse|hostmaster|postmaster|webmaster\\$' AND mail_forward IS NULL"
            .into())
    })
}

fn r252<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok("UPDATE plugin SET plugin_lockers = '{}' WHERE plugin_lockers = 'null'".into())
    })
}

fn r253<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok(ctx
            .schema()
            .change_column(
                "domain_dns",
                "domain_dns_status",
                "domain_dns_status TEXT CHARACTER SET utf8 COLLATE utf8_unicode_ci NOT NULL",
            )
            .into())
    })
}

/// Mail type list without its mailbox entries (`normal_mail`, `alias_mail`...)
fn strip_mailbox_types(mail_type: &str) -> String {
    mail_type
        .split(',')
        .filter(|kind| !kind.is_empty() && !kind.ends_with("_mail"))
        .collect::<Vec<_>>()
        .join(",")
}

/// The server hostname is a Postfix canonical domain, which cannot also be a
/// virtual mailbox domain. Mailbox+forward accounts become forward-only and
/// plain mailboxes are scheduled for deletion.
fn r254<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let hostname = ctx.settings.require("SERVER_HOSTNAME")?;
        let mailboxes = ctx.db.fetch_all(CANONICAL_MAILBOXES, &[hostname]).await?;

        for row in &mailboxes {
            let mail_id = row.require("mail_id")?;
            let mail_type = row.require("mail_type")?;

            if mail_type.contains("_forward") {
                let forward_only = strip_mailbox_types(mail_type);
                ctx.db
                    .execute_with(
                        "UPDATE mail_users SET mail_pass = '_no_', mail_type = ?, quota = NULL WHERE mail_id = ?",
                        &[forward_only.as_str(), mail_id],
                    )
                    .await?;
            } else {
                ctx.db
                    .execute_with(
                        "UPDATE mail_users SET status = 'todelete' WHERE mail_id = ?",
                        &[mail_id],
                    )
                    .await?;
            }
        }

        Ok(StepResult::NoOp)
    })
}

fn r255<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok("UPDATE mail_users SET po_active = 'no' WHERE mail_type NOT LIKE '%_mail%'".into())
    })
}

fn r256<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        unset_config_keys(ctx, &["COMPRESS_OUTPUT", "SHOW_COMPRESSION_SIZE"]).await
    })
}

fn r257<'a>(ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        let schema = ctx.schema();
        Ok(vec![
            schema.change_column(
                "user_gui_props",
                "lang",
                "lang varchar(15) collate utf8_unicode_ci DEFAULT 'browser'",
            ),
            "UPDATE user_gui_props SET lang = 'browser' WHERE lang = 'auto'".to_string(),
            schema.change_column(
                "user_gui_props",
                "layout",
                "layout varchar(100) collate utf8_unicode_ci NOT NULL DEFAULT 'default'",
            ),
            schema.change_column(
                "user_gui_props",
                "layout_color",
                "layout_color varchar(15) COLLATE utf8_unicode_ci NOT NULL DEFAULT 'black'",
            ),
            schema.change_column(
                "user_gui_props",
                "show_main_menu_labels",
                "show_main_menu_labels tinyint(1) NOT NULL DEFAULT '0'",
            ),
        ]
        .into())
    })
}

fn r258<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok("DELETE FROM php_ini \
            WHERE domain_id NOT IN (SELECT subdomain_alias_id FROM subdomain_alias WHERE subdomain_alias_status <> 'todelete') \
            AND domain_type = 'subals'"
            .into())
    })
}

fn r259<'a>(_ctx: &'a mut StepContext<'_>) -> StepFuture<'a> {
    Box::pin(async move {
        Ok("UPDATE ftp_group AS t1, \
            (SELECT gid, group_concat(userid SEPARATOR ',') AS members FROM ftp_users GROUP BY gid) AS t2 \
            SET t1.members = t2.members \
            WHERE t1.gid = t2.gid"
            .into())
    })
}
