use super::*;

#[test]
fn vitrine_errors_map_to_statuses() {
    assert_eq!(vitrine_error_to_status(VitrineError::ItemNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
    assert_eq!(vitrine_error_to_status(VitrineError::Forbidden), StatusCode::FORBIDDEN);
    assert_eq!(vitrine_error_to_status(VitrineError::TrialExpired), StatusCode::FORBIDDEN);
    assert_eq!(
        vitrine_error_to_status(VitrineError::InsufficientCredits),
        StatusCode::PAYMENT_REQUIRED
    );
    assert_eq!(vitrine_error_to_status(VitrineError::Invalid("x")), StatusCode::BAD_REQUEST);
    assert_eq!(
        vitrine_error_to_status(VitrineError::Db(sqlx::Error::PoolClosed)),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
