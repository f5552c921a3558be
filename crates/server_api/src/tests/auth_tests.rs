use super::*;
use crate::test_support::{mumbai_manager, seeded_context};
use shared::domain::{OfficeId, Role, User, UserId};

fn credentials(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.into(),
        password: password.into(),
    }
}

#[tokio::test]
async fn demo_manager_logs_in_with_office_scope() {
    let ctx = seeded_context().await;
    let response = login(&ctx, credentials("mumbai_manager", DEMO_PASSWORD))
        .await
        .expect("login");

    assert_eq!(response.user.role, Role::OfficeManager);
    assert_eq!(response.user.office_id, Some(OfficeId::from("mumbai-hub")));

    let session = authenticate(&ctx, &response.token).expect("session");
    assert_eq!(session, mumbai_manager());
}

#[tokio::test]
async fn courier_session_carries_roster_link() {
    let ctx = seeded_context().await;
    let response = login(&ctx, credentials("raj_courier", DEMO_PASSWORD))
        .await
        .expect("login");
    let session = authenticate(&ctx, &response.token).expect("session");
    assert_eq!(session.role, Role::Courier);
    assert_eq!(session.courier_id.as_ref().map(|id| id.as_str()), Some("courier1"));
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let ctx = seeded_context().await;
    let wrong_password = login(&ctx, credentials("admin", "4321"))
        .await
        .expect_err("wrong password");
    let unknown_user = login(&ctx, credentials("nobody", DEMO_PASSWORD))
        .await
        .expect_err("unknown user");

    assert_eq!(wrong_password.code, ErrorCode::InvalidCredentials);
    assert_eq!(unknown_user.code, ErrorCode::InvalidCredentials);
    assert_eq!(wrong_password.message, unknown_user.message);
}

#[tokio::test]
async fn office_roles_without_an_office_cannot_log_in() {
    let ctx = seeded_context().await;
    let password_hash = crate::credentials::hash_password_with(DEMO_PASSWORD, 1_000).expect("hash");
    ctx.repos
        .users
        .insert_user(&User {
            id: UserId::from("manager9"),
            username: "floating_manager".into(),
            password_hash,
            email: "floating@parcel.test".into(),
            role: Role::OfficeManager,
            office_id: None,
            courier_id: None,
        })
        .await
        .expect("insert");

    let err = login(&ctx, credentials("floating_manager", DEMO_PASSWORD))
        .await
        .expect_err("no office");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let admin = login(&ctx, credentials("admin", DEMO_PASSWORD))
        .await
        .expect("admins need no office");
    assert_eq!(admin.user.office_id, None);
}

#[tokio::test]
async fn blank_credentials_are_a_validation_error() {
    let ctx = seeded_context().await;
    let err = login(&ctx, credentials("", DEMO_PASSWORD))
        .await
        .expect_err("blank username");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = login(&ctx, credentials("admin", "   "))
        .await
        .expect_err("blank password");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let ctx = seeded_context().await;
    let err = authenticate(&ctx, "not.a.jwt").expect_err("garbage");
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn profile_omits_password_hash() {
    let ctx = seeded_context().await;
    let session = Session {
        user_id: UserId::from("customer1"),
        role: Role::Customer,
        office_id: None,
        courier_id: None,
    };
    let profile = profile(&ctx, &session).await.expect("profile");
    assert_eq!(profile.username, "john_customer");

    let json = serde_json::to_value(&profile).expect("json");
    assert!(json.get("password_hash").is_none());
    assert_eq!(json["role"], "CUSTOMER");
}

#[tokio::test]
async fn seeding_twice_skips_existing_records() {
    let repos = Repositories::in_memory();
    let first = seed_demo_data_with(&repos, 1_000).await.expect("first");
    let second = seed_demo_data_with(&repos, 1_000).await.expect("second");

    assert_eq!(first.skipped, 0);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, first.inserted);
}
