use super::*;

#[test]
fn visibility_errors_map_to_statuses() {
    assert_eq!(visibility_error_to_status(VisibilityError::Forbidden), StatusCode::FORBIDDEN);
    assert_eq!(
        visibility_error_to_status(VisibilityError::Db(sqlx::Error::PoolClosed)),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn access_errors_map_to_statuses() {
    assert_eq!(access_error_to_status(AccessError::Forbidden), StatusCode::FORBIDDEN);
    assert_eq!(access_error_to_status(AccessError::InvalidCode), StatusCode::BAD_REQUEST);
    assert_eq!(access_error_to_status(AccessError::VerificationFailed), StatusCode::FORBIDDEN);
    assert_eq!(access_error_to_status(AccessError::LockedOut), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        access_error_to_status(AccessError::Db(sqlx::Error::PoolClosed)),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn queue_errors_map_to_statuses() {
    assert_eq!(queue_error_to_status(QueueError::RoomNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
    assert_eq!(queue_error_to_status(QueueError::RoomFull), StatusCode::CONFLICT);
    assert_eq!(queue_error_to_status(QueueError::Forbidden), StatusCode::FORBIDDEN);
    assert_eq!(
        queue_error_to_status(QueueError::Db(sqlx::Error::PoolClosed)),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
