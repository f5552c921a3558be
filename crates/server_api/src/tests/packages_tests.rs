use super::*;
use crate::test_support::{
    admin, bangalore_manager, jane, john, mumbai_manager, raj, seeded_context,
};
use shared::domain::{Contact, Dimensions};

fn pkg1() -> PackageId {
    PackageId::from("pkg1")
}

fn parcel_request() -> CreatePackageRequest {
    CreatePackageRequest {
        sender: Contact {
            name: "John Customer".into(),
            address: "Mumbai, Maharashtra".into(),
            phone: "+91 98765 43210".into(),
        },
        receiver: Contact {
            name: "Jane Doe".into(),
            address: "Bangalore, Karnataka".into(),
            phone: "+91 98765 43211".into(),
        },
        weight: 1.2,
        dimensions: Dimensions {
            length: 20.0,
            width: 15.0,
            height: 10.0,
        },
        current_location: None,
        remarks: None,
        office_id: None,
    }
}

fn status(status: PackageStatus) -> UpdateStatusRequest {
    UpdateStatusRequest {
        status,
        office_id: None,
        remarks: None,
    }
}

fn arrival_at(office: &str) -> UpdateStatusRequest {
    UpdateStatusRequest {
        status: PackageStatus::AtHub,
        office_id: Some(OfficeId::from(office)),
        remarks: None,
    }
}

fn assert_timestamps_ordered(package: &Package) {
    assert!(
        package.updated_at >= package.created_at,
        "updated_at {} precedes created_at {}",
        package.updated_at,
        package.created_at
    );
}

/// Approves the demo parcel and walks it to the Mumbai hub.
async fn demo_parcel_at_mumbai_hub(ctx: &ApiContext) -> Package {
    approve_package(ctx, &admin(), &pkg1()).await.expect("approve");
    update_status(ctx, &mumbai_manager(), &pkg1(), status(PackageStatus::InTransit))
        .await
        .expect("in transit");
    update_status(ctx, &mumbai_manager(), &pkg1(), arrival_at("mumbai-hub"))
        .await
        .expect("at hub")
}

#[tokio::test]
async fn tracking_demo_parcel_returns_sender_and_pending() {
    let ctx = seeded_context().await;
    let view = track(&ctx, "TN20240001").await.expect("track");

    assert_eq!(view.package.sender.name, "John Customer");
    assert_eq!(view.package.status, PackageStatus::Pending);
    assert!(view.timeline.iter().all(|step| !step.reached));
}

#[tokio::test]
async fn tracking_unknown_number_is_not_found() {
    let ctx = seeded_context().await;
    let err = track(&ctx, "TN00000000").await.expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn create_defaults_location_to_sender_address() {
    let ctx = seeded_context().await;
    let package = create_package(&ctx, &john(), parcel_request(), None)
        .await
        .expect("create");

    assert_eq!(package.current_location, "Mumbai, Maharashtra");
    assert_eq!(package.receiver.address, "Bangalore, Karnataka");
    assert_eq!(package.status, PackageStatus::Pending);
    assert!(!package.admin_approved);
    assert!(package.tracking_number.starts_with("TN"));
    assert_eq!(package.customer_id, Some(john().user_id));
    assert_timestamps_ordered(&package);

    let tracked = track(&ctx, &package.tracking_number).await.expect("track");
    assert_eq!(tracked.package.id, package.id);
}

#[tokio::test]
async fn create_keeps_explicit_location() {
    let ctx = seeded_context().await;
    let mut request = parcel_request();
    request.current_location = Some("Dadar drop box".into());
    let package = create_package(&ctx, &john(), request, None)
        .await
        .expect("create");
    assert_eq!(package.current_location, "Dadar drop box");
}

#[tokio::test]
async fn create_rejects_non_positive_weight_and_blank_receiver() {
    let ctx = seeded_context().await;

    let mut request = parcel_request();
    request.weight = 0.0;
    let err = create_package(&ctx, &john(), request, None)
        .await
        .expect_err("weight");
    assert_eq!(err.code, ErrorCode::Validation);

    let mut request = parcel_request();
    request.receiver.address = "  ".into();
    let err = create_package(&ctx, &john(), request, None)
        .await
        .expect_err("address");
    assert_eq!(err.code, ErrorCode::Validation);

    let mut request = parcel_request();
    request.dimensions.height = -1.0;
    let err = create_package(&ctx, &john(), request, None)
        .await
        .expect_err("dimensions");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn create_rejects_unknown_office() {
    let ctx = seeded_context().await;
    let mut request = parcel_request();
    request.office_id = Some(OfficeId::from("atlantis-hub"));
    let err = create_package(&ctx, &john(), request, None)
        .await
        .expect_err("office");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn office_managers_cannot_create_packages() {
    let ctx = seeded_context().await;
    let err = create_package(&ctx, &mumbai_manager(), parcel_request(), None)
        .await
        .expect_err("forbidden");
    assert_eq!(err.code, ErrorCode::Forbidden);
}

#[tokio::test]
async fn repeated_idempotency_key_creates_once() {
    let ctx = seeded_context().await;
    let first = create_package(&ctx, &john(), parcel_request(), Some("order-42"))
        .await
        .expect("first");
    let replay = create_package(&ctx, &john(), parcel_request(), Some("order-42"))
        .await
        .expect("replay");
    assert_eq!(first.id, replay.id);

    let other_user = create_package(&ctx, &jane(), parcel_request(), Some("order-42"))
        .await
        .expect("other user");
    assert_ne!(first.id, other_user.id);

    let mine = list_by_customer(&ctx, &john()).await.expect("list");
    assert_eq!(mine.len(), 2, "demo parcel plus one created package");
}

#[tokio::test]
async fn customers_only_see_their_own_packages() {
    let ctx = seeded_context().await;
    create_package(&ctx, &jane(), parcel_request(), None)
        .await
        .expect("create");

    let johns = list_by_customer(&ctx, &john()).await.expect("john");
    assert_eq!(johns.len(), 1);
    assert_eq!(johns[0].id, pkg1());

    let janes = list_by_customer(&ctx, &jane()).await.expect("jane");
    assert_eq!(janes.len(), 1);
    assert_ne!(janes[0].id, pkg1());
}

#[tokio::test]
async fn pending_list_never_contains_approved_packages() {
    let ctx = seeded_context().await;
    create_package(&ctx, &john(), parcel_request(), None)
        .await
        .expect("create");

    let pending = list_pending_approval(&ctx, &admin()).await.expect("pending");
    assert_eq!(pending.len(), 2);

    approve_package(&ctx, &admin(), &pkg1()).await.expect("approve");
    let pending = list_pending_approval(&ctx, &admin()).await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert!(pending.iter().all(|package| !package.admin_approved));
}

#[tokio::test]
async fn approving_twice_leaves_registered() {
    let ctx = seeded_context().await;
    let first = approve_package(&ctx, &admin(), &pkg1()).await.expect("first");
    let second = approve_package(&ctx, &admin(), &pkg1()).await.expect("second");

    assert!(second.admin_approved);
    assert_eq!(second.status, PackageStatus::Registered);
    assert!(second.updated_at >= first.updated_at);
    assert_timestamps_ordered(&second);
}

#[tokio::test]
async fn approval_does_not_rewind_a_moving_package() {
    let ctx = seeded_context().await;
    approve_package(&ctx, &admin(), &pkg1()).await.expect("approve");
    update_status(&ctx, &admin(), &pkg1(), status(PackageStatus::InTransit))
        .await
        .expect("in transit");

    let err = approve_package(&ctx, &admin(), &pkg1())
        .await
        .expect_err("rewind");
    assert_eq!(err.code, ErrorCode::InvalidTransition);
}

#[tokio::test]
async fn only_admins_approve() {
    let ctx = seeded_context().await;
    let err = approve_package(&ctx, &john(), &pkg1())
        .await
        .expect_err("customer");
    assert_eq!(err.code, ErrorCode::Forbidden);
}

#[tokio::test]
async fn pending_package_cannot_change_status() {
    let ctx = seeded_context().await;
    let err = update_status(&ctx, &admin(), &pkg1(), status(PackageStatus::InTransit))
        .await
        .expect_err("pending");
    assert_eq!(err.code, ErrorCode::InvalidTransition);
}

#[tokio::test]
async fn terminal_states_reject_every_transition() {
    for terminal in [PackageStatus::Delivered, PackageStatus::Cancelled] {
        let ctx = seeded_context().await;
        demo_parcel_at_mumbai_hub(&ctx).await;
        if terminal == PackageStatus::Delivered {
            update_status(&ctx, &admin(), &pkg1(), status(PackageStatus::OutForDelivery))
                .await
                .expect("out for delivery");
        }
        update_status(&ctx, &admin(), &pkg1(), status(terminal))
            .await
            .expect("terminal");

        for next in PackageStatus::ALL {
            let err = update_status(&ctx, &admin(), &pkg1(), status(next))
                .await
                .expect_err("terminal state must not move");
            assert_eq!(err.code, ErrorCode::InvalidTransition, "{terminal} -> {next}");
        }
    }
}

#[tokio::test]
async fn skipping_lifecycle_steps_is_rejected() {
    let ctx = seeded_context().await;
    approve_package(&ctx, &admin(), &pkg1()).await.expect("approve");
    let err = update_status(&ctx, &admin(), &pkg1(), status(PackageStatus::Delivered))
        .await
        .expect_err("skip");
    assert_eq!(err.code, ErrorCode::InvalidTransition);
}

#[tokio::test]
async fn updating_unknown_package_is_not_found() {
    let ctx = seeded_context().await;
    let err = update_status(
        &ctx,
        &admin(),
        &PackageId::from("pkg404"),
        status(PackageStatus::InTransit),
    )
    .await
    .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn mutations_keep_updated_at_after_created_at() {
    let ctx = seeded_context().await;
    let package = demo_parcel_at_mumbai_hub(&ctx).await;
    assert_timestamps_ordered(&package);

    let package = assign_courier(&ctx, &mumbai_manager(), &pkg1(), &CourierId::from("courier1"))
        .await
        .expect("assign");
    assert_timestamps_ordered(&package);

    let package = update_status(&ctx, &raj(), &pkg1(), status(PackageStatus::OutForDelivery))
        .await
        .expect("out for delivery");
    assert_timestamps_ordered(&package);
}

#[tokio::test]
async fn office_view_shows_only_approved_packages_of_that_office() {
    let ctx = seeded_context().await;
    let mumbai = OfficeId::from("mumbai-hub");

    let before = list_by_office(&ctx, &mumbai_manager(), &mumbai)
        .await
        .expect("list");
    assert!(before.is_empty(), "pending parcel must stay hidden");

    approve_package(&ctx, &admin(), &pkg1()).await.expect("approve");
    let after = list_by_office(&ctx, &mumbai_manager(), &mumbai)
        .await
        .expect("list");
    assert_eq!(after.len(), 1);

    let bangalore = list_by_office(&ctx, &admin(), &OfficeId::from("bangalore-hub"))
        .await
        .expect("admin list");
    assert!(bangalore.is_empty());
}

#[tokio::test]
async fn managers_cannot_list_other_offices() {
    let ctx = seeded_context().await;
    let err = list_by_office(&ctx, &bangalore_manager(), &OfficeId::from("mumbai-hub"))
        .await
        .expect_err("scope");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = list_by_office(&ctx, &admin(), &OfficeId::from("atlantis-hub"))
        .await
        .expect_err("unknown office");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn courier_assignment_requires_hub_arrival() {
    let ctx = seeded_context().await;
    approve_package(&ctx, &admin(), &pkg1()).await.expect("approve");

    let err = assign_courier(&ctx, &mumbai_manager(), &pkg1(), &CourierId::from("courier1"))
        .await
        .expect_err("not at hub");
    assert_eq!(err.code, ErrorCode::Conflict);
}

#[tokio::test]
async fn pending_package_cannot_get_a_courier() {
    let ctx = seeded_context().await;
    let err = assign_courier(&ctx, &admin(), &pkg1(), &CourierId::from("courier1"))
        .await
        .expect_err("pending");
    assert_eq!(err.code, ErrorCode::Conflict);
}

#[tokio::test]
async fn courier_must_belong_to_the_handling_office() {
    let ctx = seeded_context().await;
    demo_parcel_at_mumbai_hub(&ctx).await;
    let outsider = crate::create_courier(
        &ctx,
        &admin(),
        shared::protocol::CreateCourierRequest {
            name: "Kiran Rao".into(),
            phone: "+91 98765 43212".into(),
            office_id: OfficeId::from("bangalore-hub"),
        },
    )
    .await
    .expect("courier");

    let err = assign_courier(&ctx, &mumbai_manager(), &pkg1(), &outsider.id)
        .await
        .expect_err("wrong office");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = assign_courier(&ctx, &mumbai_manager(), &pkg1(), &CourierId::from("ghost"))
        .await
        .expect_err("unknown courier");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn assigned_courier_sees_and_delivers_the_package() {
    let ctx = seeded_context().await;
    demo_parcel_at_mumbai_hub(&ctx).await;
    assign_courier(&ctx, &mumbai_manager(), &pkg1(), &CourierId::from("courier1"))
        .await
        .expect("assign");

    let assigned = list_by_courier(&ctx, &raj()).await.expect("assigned");
    assert_eq!(assigned.len(), 1);

    let choices = allowed_next(&ctx, &raj(), &pkg1()).await.expect("choices");
    assert_eq!(choices.current, PackageStatus::AtHub);
    assert!(choices.allowed.contains(&PackageStatus::OutForDelivery));

    update_status(&ctx, &raj(), &pkg1(), status(PackageStatus::OutForDelivery))
        .await
        .expect("out for delivery");
    let delivered = update_status(&ctx, &raj(), &pkg1(), status(PackageStatus::Delivered))
        .await
        .expect("delivered");
    assert_eq!(delivered.status, PackageStatus::Delivered);

    let view = track(&ctx, "TN20240001").await.expect("track");
    assert!(view.timeline.iter().all(|step| step.reached));
}

#[tokio::test]
async fn unassigned_courier_is_forbidden() {
    let ctx = seeded_context().await;
    demo_parcel_at_mumbai_hub(&ctx).await;
    let err = update_status(&ctx, &raj(), &pkg1(), status(PackageStatus::OutForDelivery))
        .await
        .expect_err("not assigned");
    assert_eq!(err.code, ErrorCode::Forbidden);
}

#[tokio::test]
async fn hub_arrival_hands_package_to_the_receiving_office() {
    let ctx = seeded_context().await;
    demo_parcel_at_mumbai_hub(&ctx).await;
    update_status(&ctx, &mumbai_manager(), &pkg1(), status(PackageStatus::InTransit))
        .await
        .expect("in transit");

    let arrived = update_status(&ctx, &bangalore_manager(), &pkg1(), arrival_at("bangalore-hub"))
        .await
        .expect("arrival");
    assert_eq!(arrived.office_id, Some(OfficeId::from("bangalore-hub")));
    assert_eq!(arrived.current_location, "Bangalore Hub");

    let mumbai = list_by_office(&ctx, &mumbai_manager(), &OfficeId::from("mumbai-hub"))
        .await
        .expect("mumbai");
    assert!(mumbai.is_empty());
    let bangalore = list_by_office(&ctx, &bangalore_manager(), &OfficeId::from("bangalore-hub"))
        .await
        .expect("bangalore");
    assert_eq!(bangalore.len(), 1);
}

#[tokio::test]
async fn other_office_cannot_take_a_package_out_for_delivery() {
    let ctx = seeded_context().await;
    demo_parcel_at_mumbai_hub(&ctx).await;
    assign_courier(&ctx, &mumbai_manager(), &pkg1(), &CourierId::from("courier1"))
        .await
        .expect("assign");
    update_status(&ctx, &raj(), &pkg1(), status(PackageStatus::OutForDelivery))
        .await
        .expect("out for delivery");

    let err = update_status(&ctx, &bangalore_manager(), &pkg1(), arrival_at("bangalore-hub"))
        .await
        .expect_err("takeover");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let view = track(&ctx, "TN20240001").await.expect("track");
    assert_eq!(view.package.status, PackageStatus::OutForDelivery);
    assert_eq!(view.package.office_id, Some(OfficeId::from("mumbai-hub")));
    assert_eq!(view.package.assigned_courier, Some(CourierId::from("courier1")));
}

#[tokio::test]
async fn other_office_cannot_take_a_package_a_courier_carries() {
    let ctx = seeded_context().await;
    demo_parcel_at_mumbai_hub(&ctx).await;
    assign_courier(&ctx, &mumbai_manager(), &pkg1(), &CourierId::from("courier1"))
        .await
        .expect("assign");
    update_status(&ctx, &mumbai_manager(), &pkg1(), status(PackageStatus::InTransit))
        .await
        .expect("in transit");

    let err = update_status(&ctx, &bangalore_manager(), &pkg1(), arrival_at("bangalore-hub"))
        .await
        .expect_err("courier still assigned");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let arrived = update_status(&ctx, &admin(), &pkg1(), arrival_at("bangalore-hub"))
        .await
        .expect("admin records arrival");
    assert_eq!(arrived.office_id, Some(OfficeId::from("bangalore-hub")));
    assert_eq!(arrived.assigned_courier, None);
}

#[tokio::test]
async fn unapproved_package_has_no_choices_for_office_staff() {
    let ctx = seeded_context().await;
    let err = allowed_next(&ctx, &mumbai_manager(), &pkg1())
        .await
        .expect_err("awaiting approval");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let choices = allowed_next(&ctx, &admin(), &pkg1()).await.expect("admin");
    assert_eq!(choices.current, PackageStatus::Pending);

    approve_package(&ctx, &admin(), &pkg1()).await.expect("approve");
    let choices = allowed_next(&ctx, &mumbai_manager(), &pkg1())
        .await
        .expect("approved");
    assert!(choices.allowed.contains(&PackageStatus::InTransit));
}

#[tokio::test]
async fn managers_cannot_move_packages_of_other_offices() {
    let ctx = seeded_context().await;
    approve_package(&ctx, &admin(), &pkg1()).await.expect("approve");
    let err = update_status(&ctx, &bangalore_manager(), &pkg1(), status(PackageStatus::InTransit))
        .await
        .expect_err("scope");
    assert_eq!(err.code, ErrorCode::Forbidden);
}

#[tokio::test]
async fn concurrent_updates_on_one_package_apply_once() {
    let ctx = seeded_context().await;
    approve_package(&ctx, &admin(), &pkg1()).await.expect("approve");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            update_status(&ctx, &admin(), &pkg1(), status(PackageStatus::InTransit)).await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => applied += 1,
            Err(err) => assert_eq!(err.code, ErrorCode::InvalidTransition),
        }
    }
    assert_eq!(applied, 1);
}
