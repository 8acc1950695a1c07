use super::*;

#[test]
fn credit_errors_map_to_statuses() {
    assert_eq!(credit_error_to_status(CreditError::Insufficient), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(credit_error_to_status(CreditError::NotFound(Uuid::nil())), StatusCode::NOT_FOUND);
    assert_eq!(
        credit_error_to_status(CreditError::Db(sqlx::Error::PoolClosed)),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn notify_errors_map_to_statuses() {
    assert_eq!(
        notify_error_to_status(NotifyError::Db(sqlx::Error::PoolClosed)),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
