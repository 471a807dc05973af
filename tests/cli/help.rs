use crate::helpers::cli::CliTestHelper;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    let helper = CliTestHelper::new();

    helper
        .command()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("apply")
                .and(predicate::str::contains("status"))
                .and(predicate::str::contains("seed"))
                .and(predicate::str::contains("release")),
        );
}

#[test]
fn test_apply_help_shows_database_options() {
    let helper = CliTestHelper::new();

    helper
        .command()
        .args(["apply", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--database-url").and(predicate::str::contains("--lock-file")),
        );
}

#[test]
fn test_unknown_command_is_rejected() {
    let helper = CliTestHelper::new();

    helper
        .command()
        .arg("rollback")
        .assert()
        .failure()
        .stderr(predicate::str::contains("rollback"));
}
