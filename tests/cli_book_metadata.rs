use predicates::prelude::*;

#[test]
fn non_pegasas_url_is_rejected_with_a_message() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("book_metadata");
    cmd.args(["https://example.com/book/1"])
        .assert()
        .success()
        .stdout("Please provide a valid Pegasas book URL.\n");
}

#[test]
fn url_without_scheme_is_rejected() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("book_metadata");
    cmd.args(["www.pegasas.lt/knyga"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid Pegasas book URL"));
}

#[test]
fn missing_url_prints_usage() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("book_metadata");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn rust_log_debug_emits_parsed_cli_to_stderr() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("book_metadata");
    cmd.env("RUST_LOG", "debug")
        .args(["https://example.com/"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
}
