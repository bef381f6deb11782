use super::*;

#[test]
fn test_typed_kinds() {
    assert_eq!(
        Error::UnknownAgent("x".into()).typed_kind(),
        Some(ErrorKind::Fatal)
    );
    assert_eq!(
        Error::CircuitOpen {
            agent: "risk".into()
        }
        .typed_kind(),
        Some(ErrorKind::CircuitOpen)
    );
    assert_eq!(
        Error::Llm(docket_llm::Error::Timeout(10)).typed_kind(),
        Some(ErrorKind::Timeout)
    );
    assert_eq!(
        Error::Llm(docket_llm::Error::RateLimit).typed_kind(),
        Some(ErrorKind::Transient)
    );
    assert_eq!(
        Error::Llm(docket_llm::Error::Authentication("bad key".into())).typed_kind(),
        Some(ErrorKind::Fatal)
    );
    assert_eq!(
        Error::Tool(docket_tools::Error::PermissionDenied("no".into())).typed_kind(),
        Some(ErrorKind::Fatal)
    );
    assert_eq!(
        Error::Retrieval("index down".into()).typed_kind(),
        Some(ErrorKind::Transient)
    );
    assert_eq!(Error::Agent("??".into()).typed_kind(), None);
}

#[test]
fn test_kind_retryable() {
    assert!(ErrorKind::Transient.is_retryable());
    assert!(ErrorKind::Timeout.is_retryable());
    assert!(!ErrorKind::Fatal.is_retryable());
    assert!(!ErrorKind::CircuitOpen.counts_as_failure());
    assert_eq!(ErrorKind::CircuitOpen.to_string(), "circuit_open");
}

#[test]
fn test_format_error_for_cli() {
    let output = format_error_for_cli(&Error::UnknownAgent("summery".into()));
    assert!(output.contains("summery"));
    assert!(output.contains("docket agents"));

    let plain = format_error_for_cli(&Error::Cancelled);
    assert!(plain.contains("cancelled"));
}
