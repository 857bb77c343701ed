use tarn_frontend::parse_source;

#[test]
fn unexpected_token_names_expected_and_actual() {
    let err = parse_source("def 42() end").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("expected identifier"), "got: {msg}");
    assert!(msg.contains("integer literal"), "got: {msg}");
}

#[test]
fn diagnostics_carry_source_position() {
    let err = parse_source("def f(\n  a int\n) end").unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("2:"), "got: {msg}");
}

#[test]
fn missing_end_aborts_at_eof() {
    let err = parse_source("def f()\n  return 1\n").unwrap_err();
    assert!(err.to_string().contains("expected 'end'"), "got: {err}");
}

#[test]
fn lexical_error_surfaces_as_unexpected_token() {
    let err = parse_source("var x = !").unwrap_err();
    assert!(err.to_string().contains("invalid token"), "got: {err}");
}

#[test]
fn first_error_aborts_the_unit() {
    // No partial recovery: the result is an error, not a partial list.
    assert!(parse_source("struct end").is_err());
}
