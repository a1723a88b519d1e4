//! Repository tests against a migrated database.
//!
//! Each test gets a fresh database from `#[sqlx::test]`.

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use vitrine_core::billing::{InvoiceStatus, SubscriptionStatus};
use vitrine_core::types::{DbId, Timestamp};
use vitrine_db::models::coupon::CreateCoupon;
use vitrine_db::models::invoice::CreateInvoice;
use vitrine_db::models::payment_method::CreatePaymentMethod;
use vitrine_db::models::plan::{CreatePlan, Plan, UpdatePlan};
use vitrine_db::models::session::CreateSession;
use vitrine_db::models::subscription::{CreateSubscription, RenewSubscription};
use vitrine_db::models::user::{CreateUser, User};
use vitrine_db::models::user_token::CreateUserToken;
use vitrine_db::repositories::{
    CouponRepo, InvoiceRepo, PaymentMethodRepo, PlanRepo, RoleRepo, SessionRepo,
    SubscriptionRepo, UserRepo, UserTokenRepo,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

async fn new_user(pool: &PgPool, email: &str) -> User {
    let role = RoleRepo::find_by_name(pool, "user").await.unwrap().unwrap();
    UserRepo::create(
        pool,
        &CreateUser {
            name: "Teste".to_string(),
            email: email.to_string(),
            password_hash: "not-a-real-hash".to_string(),
            role_id: role.id,
        },
    )
    .await
    .unwrap()
}

async fn new_plan(pool: &PgPool, code: &str, price_cents: i64) -> Plan {
    PlanRepo::create(
        pool,
        &CreatePlan {
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            price_cents,
            currency: "BRL".to_string(),
            billing_interval: "month".to_string(),
            trial_days: 0,
            features: vec!["a".to_string()],
        },
    )
    .await
    .unwrap()
}

fn session_input(user_id: DbId, hash: &str) -> CreateSession {
    CreateSession {
        user_id,
        refresh_token_hash: hash.to_string(),
        expires_at: Utc::now() + Duration::days(7),
        user_agent: Some("test-agent".to_string()),
        ip_address: Some("127.0.0.1".to_string()),
    }
}

fn subscription_input(
    user_id: DbId,
    plan_id: DbId,
    start: Timestamp,
    coupon_id: Option<DbId>,
) -> CreateSubscription {
    CreateSubscription {
        user_id,
        plan_id,
        status: SubscriptionStatus::Active,
        current_period_start: start,
        current_period_end: start + Duration::days(30),
        trial_end: None,
        coupon_id,
    }
}

fn invoice_draft(user_id: DbId, plan: &Plan, amount: i64, card: Option<DbId>) -> CreateInvoice {
    let now = Utc::now();
    CreateInvoice {
        user_id,
        subscription_id: None,
        plan_id: plan.id,
        description: format!("Assinatura {}", plan.name),
        subtotal_cents: amount,
        discount_cents: 0,
        amount_due_cents: amount,
        currency: plan.currency.clone(),
        period_start: now,
        period_end: now + Duration::days(30),
        due_at: now,
        payment_method_id: card,
    }
}

// ---------------------------------------------------------------------------
// Users and roles
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn seeded_roles_resolve_by_id(pool: PgPool) {
    assert_eq!(RoleRepo::resolve_name(&pool, 1).await.unwrap(), "admin");
    assert_eq!(RoleRepo::resolve_name(&pool, 2).await.unwrap(), "user");
    assert_matches!(RoleRepo::find_by_id(&pool, 99).await, Ok(None));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_email_is_rejected(pool: PgPool) {
    new_user(&pool, "dup@example.com").await;
    assert!(UserRepo::email_exists(&pool, "dup@example.com").await.unwrap());

    let role = RoleRepo::find_by_name(&pool, "user").await.unwrap().unwrap();
    let again = UserRepo::create(
        &pool,
        &CreateUser {
            name: "Outro".to_string(),
            email: "dup@example.com".to_string(),
            password_hash: "x".to_string(),
            role_id: role.id,
        },
    )
    .await;
    assert_matches!(again, Err(sqlx::Error::Database(_)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn lock_resets_the_failure_count(pool: PgPool) {
    let user = new_user(&pool, "lock@example.com").await;

    for expected in 1..=3 {
        let count = UserRepo::increment_failed_login(&pool, user.id).await.unwrap();
        assert_eq!(count, expected);
    }

    let until = Utc::now() + Duration::minutes(15);
    UserRepo::lock_account(&pool, user.id, until).await.unwrap();
    let locked = UserRepo::find_by_id(&pool, user.id).await.unwrap().unwrap();
    assert!(locked.is_locked(Utc::now()));
    assert_eq!(locked.failed_login_count, 0);

    UserRepo::record_successful_login(&pool, user.id).await.unwrap();
    let unlocked = UserRepo::find_by_id(&pool, user.id).await.unwrap().unwrap();
    assert!(!unlocked.is_locked(Utc::now()));
    assert!(unlocked.last_login_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn email_verification_is_stamped_once(pool: PgPool) {
    let user = new_user(&pool, "verify@example.com").await;

    assert!(UserRepo::mark_email_verified(&pool, user.id).await.unwrap());
    assert!(!UserRepo::mark_email_verified(&pool, user.id).await.unwrap());
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn rotation_links_old_session_to_successor(pool: PgPool) {
    let user = new_user(&pool, "rotate@example.com").await;
    let first = SessionRepo::create(&pool, &session_input(user.id, "hash-1"))
        .await
        .unwrap();

    let second = SessionRepo::rotate(&pool, first.id, &session_input(user.id, "hash-2"))
        .await
        .unwrap()
        .expect("first rotation wins");

    let old = SessionRepo::find_by_refresh_token_hash(&pool, "hash-1")
        .await
        .unwrap()
        .unwrap();
    assert!(old.was_rotated());
    assert_eq!(old.replaced_by_id, Some(second.id));
    assert!(!SessionRepo::is_active(&pool, first.id, user.id).await.unwrap());
    assert!(SessionRepo::is_active(&pool, second.id, user.id).await.unwrap());

    // A racing second rotation of the same session loses.
    let lost = SessionRepo::rotate(&pool, first.id, &session_input(user.id, "hash-3"))
        .await
        .unwrap();
    assert!(lost.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn revocation_respects_ownership(pool: PgPool) {
    let alice = new_user(&pool, "alice@example.com").await;
    let bob = new_user(&pool, "bob@example.com").await;
    let a1 = SessionRepo::create(&pool, &session_input(alice.id, "a1")).await.unwrap();
    let a2 = SessionRepo::create(&pool, &session_input(alice.id, "a2")).await.unwrap();
    let a3 = SessionRepo::create(&pool, &session_input(alice.id, "a3")).await.unwrap();

    assert!(!SessionRepo::revoke_for_user(&pool, a1.id, bob.id).await.unwrap());
    assert!(SessionRepo::revoke_for_user(&pool, a1.id, alice.id).await.unwrap());

    let revoked = SessionRepo::revoke_all_except(&pool, alice.id, a3.id).await.unwrap();
    assert_eq!(revoked, 1);
    assert!(!SessionRepo::is_active(&pool, a2.id, alice.id).await.unwrap());

    let active = SessionRepo::list_active_for_user(&pool, alice.id).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, a3.id);

    // Someone else's session id never reads as active.
    assert!(!SessionRepo::is_active(&pool, a3.id, bob.id).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cleanup_removes_expired_sessions(pool: PgPool) {
    let user = new_user(&pool, "old@example.com").await;
    let mut expired = session_input(user.id, "expired");
    expired.expires_at = Utc::now() - Duration::hours(1);
    SessionRepo::create(&pool, &expired).await.unwrap();
    SessionRepo::create(&pool, &session_input(user.id, "live")).await.unwrap();

    assert_eq!(SessionRepo::cleanup_expired(&pool).await.unwrap(), 1);
    assert!(SessionRepo::find_by_refresh_token_hash(&pool, "live")
        .await
        .unwrap()
        .is_some());
}

// ---------------------------------------------------------------------------
// Single-use tokens
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn tokens_are_single_use_and_replaced_on_reissue(pool: PgPool) {
    let user = new_user(&pool, "token@example.com").await;
    let issue = |hash: &'static str| CreateUserToken {
        user_id: user.id,
        purpose: "password_reset",
        token_hash: hash.to_string(),
        expires_at: Utc::now() + Duration::hours(1),
    };

    UserTokenRepo::issue(&pool, &issue("first")).await.unwrap();
    UserTokenRepo::issue(&pool, &issue("second")).await.unwrap();

    // Reissue invalidated the first token.
    assert_eq!(
        UserTokenRepo::consume(&pool, "password_reset", "first").await.unwrap(),
        None
    );
    // Purpose must match.
    assert_eq!(
        UserTokenRepo::consume(&pool, "email_verification", "second").await.unwrap(),
        None
    );
    assert_eq!(
        UserTokenRepo::consume(&pool, "password_reset", "second").await.unwrap(),
        Some(user.id)
    );
    assert_eq!(
        UserTokenRepo::consume(&pool, "password_reset", "second").await.unwrap(),
        None
    );

    assert_eq!(UserTokenRepo::cleanup(&pool).await.unwrap(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_token_cannot_be_consumed(pool: PgPool) {
    let user = new_user(&pool, "late@example.com").await;
    UserTokenRepo::issue(
        &pool,
        &CreateUserToken {
            user_id: user.id,
            purpose: "email_verification",
            token_hash: "stale".to_string(),
            expires_at: Utc::now() - Duration::minutes(1),
        },
    )
    .await
    .unwrap();

    assert_eq!(
        UserTokenRepo::consume(&pool, "email_verification", "stale").await.unwrap(),
        None
    );
}

// ---------------------------------------------------------------------------
// Plans and coupons
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn inactive_plans_drop_out_of_the_catalog(pool: PgPool) {
    let plan = new_plan(&pool, "team", 9900).await;
    assert!(PlanRepo::list_active(&pool).await.unwrap().iter().any(|p| p.id == plan.id));

    let updated = PlanRepo::update(
        &pool,
        plan.id,
        &UpdatePlan {
            price_cents: Some(10900),
            is_active: Some(false),
            ..UpdatePlan::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(updated.price_cents, 10900);
    assert_eq!(updated.name, "team");
    assert!(!updated.is_active);

    assert!(!PlanRepo::list_active(&pool).await.unwrap().iter().any(|p| p.id == plan.id));
    assert_matches!(PlanRepo::update(&pool, 999_999, &UpdatePlan::default()).await, Ok(None));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn exhausted_coupon_blocks_subscription_start(pool: PgPool) {
    let plan = new_plan(&pool, "basic", 1000).await;
    let coupon = CouponRepo::create(
        &pool,
        &CreateCoupon {
            code: "ONCE".to_string(),
            percent_off: Some(50),
            amount_off_cents: None,
            max_redemptions: Some(1),
            valid_until: None,
        },
    )
    .await
    .unwrap();
    assert!(coupon.is_usable(Utc::now()));

    let first = new_user(&pool, "first@example.com").await;
    let second = new_user(&pool, "second@example.com").await;
    let now = Utc::now();

    let started = SubscriptionRepo::start(
        &pool,
        &subscription_input(first.id, plan.id, now, Some(coupon.id)),
        None,
    )
    .await
    .unwrap();
    assert!(started.is_some());

    let blocked = SubscriptionRepo::start(
        &pool,
        &subscription_input(second.id, plan.id, now, Some(coupon.id)),
        None,
    )
    .await
    .unwrap();
    assert!(blocked.is_none());
    assert!(SubscriptionRepo::find_live_for_user(&pool, second.id)
        .await
        .unwrap()
        .is_none());

    let coupon = CouponRepo::find_by_code(&pool, "ONCE").await.unwrap().unwrap();
    assert_eq!(coupon.times_redeemed, 1);
    assert!(!coupon.is_usable(Utc::now()));
}

// ---------------------------------------------------------------------------
// Subscriptions and invoices
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn first_invoice_status_follows_card_and_amount(pool: PgPool) {
    let plan = new_plan(&pool, "basic", 1000).await;
    let user = new_user(&pool, "inv@example.com").await;
    let card = PaymentMethodRepo::create(
        &pool,
        &CreatePaymentMethod {
            user_id: user.id,
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 12,
            exp_year: 2099,
            make_default: false,
        },
    )
    .await
    .unwrap();
    assert!(card.is_default);

    let charged = InvoiceRepo::create(&pool, &invoice_draft(user.id, &plan, 1000, Some(card.id)))
        .await
        .unwrap();
    assert_eq!(charged.status(), InvoiceStatus::Paid);
    assert!(charged.paid_at.is_some());

    let free = InvoiceRepo::create(&pool, &invoice_draft(user.id, &plan, 0, None))
        .await
        .unwrap();
    assert_eq!(free.status(), InvoiceStatus::Paid);

    let open = InvoiceRepo::create(&pool, &invoice_draft(user.id, &plan, 1000, None))
        .await
        .unwrap();
    assert_eq!(open.status(), InvoiceStatus::Open);

    // Numbers are unique per invoice.
    assert_ne!(charged.number, open.number);
    assert_eq!(InvoiceRepo::list_for_user(&pool, user.id).await.unwrap().len(), 3);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn paying_last_open_invoice_reactivates_past_due(pool: PgPool) {
    let plan = new_plan(&pool, "basic", 1000).await;
    let user = new_user(&pool, "due@example.com").await;
    let start = Utc::now() - Duration::days(31);

    let (subscription, invoice) = SubscriptionRepo::start(
        &pool,
        &subscription_input(user.id, plan.id, start, None),
        Some(&invoice_draft(user.id, &plan, 1000, None)),
    )
    .await
    .unwrap()
    .unwrap();
    let first = invoice.unwrap();
    assert_eq!(first.subscription_id, Some(subscription.id));

    let renewal = CreateInvoice {
        subscription_id: Some(subscription.id),
        ..invoice_draft(user.id, &plan, 1000, None)
    };
    let (renewed, second) = SubscriptionRepo::renew(
        &pool,
        &RenewSubscription {
            id: subscription.id,
            status: SubscriptionStatus::PastDue,
            current_period_start: subscription.current_period_end,
            current_period_end: subscription.current_period_end + Duration::days(30),
        },
        Some(&renewal),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(renewed.status(), SubscriptionStatus::PastDue);
    let second = second.unwrap();

    let card = PaymentMethodRepo::create(
        &pool,
        &CreatePaymentMethod {
            user_id: user.id,
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            exp_month: 12,
            exp_year: 2099,
            make_default: true,
        },
    )
    .await
    .unwrap();

    InvoiceRepo::mark_paid(&pool, first.id, user.id, card.id).await.unwrap().unwrap();
    let still = SubscriptionRepo::find_by_id(&pool, subscription.id).await.unwrap().unwrap();
    assert_eq!(still.status(), SubscriptionStatus::PastDue);

    InvoiceRepo::mark_paid(&pool, second.id, user.id, card.id).await.unwrap().unwrap();
    let active = SubscriptionRepo::find_by_id(&pool, subscription.id).await.unwrap().unwrap();
    assert_eq!(active.status(), SubscriptionStatus::Active);

    // Paying twice is refused.
    assert!(InvoiceRepo::mark_paid(&pool, second.id, user.id, card.id)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn renewal_is_guarded_by_the_period(pool: PgPool) {
    let plan = new_plan(&pool, "basic", 1000).await;
    let user = new_user(&pool, "guard@example.com").await;
    let start = Utc::now() - Duration::days(31);
    let (subscription, _) = SubscriptionRepo::start(
        &pool,
        &subscription_input(user.id, plan.id, start, None),
        None,
    )
    .await
    .unwrap()
    .unwrap();

    let due = SubscriptionRepo::list_due_for_renewal(&pool, Utc::now(), 10).await.unwrap();
    assert_eq!(due.len(), 1);

    let input = RenewSubscription {
        id: subscription.id,
        status: SubscriptionStatus::Active,
        current_period_start: subscription.current_period_end,
        current_period_end: subscription.current_period_end + Duration::days(30),
    };
    assert!(SubscriptionRepo::renew(&pool, &input, None).await.unwrap().is_some());
    assert!(SubscriptionRepo::renew(&pool, &input, None).await.unwrap().is_none());
    assert!(SubscriptionRepo::list_due_for_renewal(&pool, Utc::now(), 10)
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_now_voids_open_invoices(pool: PgPool) {
    let plan = new_plan(&pool, "basic", 1000).await;
    let user = new_user(&pool, "void@example.com").await;
    let (subscription, invoice) = SubscriptionRepo::start(
        &pool,
        &subscription_input(user.id, plan.id, Utc::now(), None),
        Some(&invoice_draft(user.id, &plan, 1000, None)),
    )
    .await
    .unwrap()
    .unwrap();

    let canceled = SubscriptionRepo::cancel_now(&pool, subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(canceled.status(), SubscriptionStatus::Canceled);
    assert!(canceled.canceled_at.is_some());

    let invoice = InvoiceRepo::find_for_user(&pool, invoice.unwrap().id, user.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(invoice.status(), InvoiceStatus::Void);

    assert!(SubscriptionRepo::cancel_now(&pool, subscription.id)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Payment methods
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn only_one_default_card_per_user(pool: PgPool) {
    let user = new_user(&pool, "cards@example.com").await;
    let card = |last4: &str, make_default: bool| CreatePaymentMethod {
        user_id: user.id,
        brand: "visa".to_string(),
        last4: last4.to_string(),
        exp_month: 6,
        exp_year: 2099,
        make_default,
    };

    let a = PaymentMethodRepo::create(&pool, &card("1111", false)).await.unwrap();
    let b = PaymentMethodRepo::create(&pool, &card("2222", true)).await.unwrap();
    assert!(b.is_default);

    let default = PaymentMethodRepo::find_default(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(default.id, b.id);
    let listed = PaymentMethodRepo::list_for_user(&pool, user.id).await.unwrap();
    assert_eq!(listed.iter().filter(|m| m.is_default).count(), 1);

    assert!(PaymentMethodRepo::delete(&pool, b.id, user.id).await.unwrap());
    let default = PaymentMethodRepo::find_default(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(default.id, a.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_first_cards_keep_a_single_default(pool: PgPool) {
    let user = new_user(&pool, "race@example.com").await;
    let card = |last4: &str| CreatePaymentMethod {
        user_id: user.id,
        brand: "visa".to_string(),
        last4: last4.to_string(),
        exp_month: 6,
        exp_year: 2099,
        make_default: false,
    };

    for round in 0..5 {
        let (first, second) = (card("1111"), card("2222"));
        let (a, b) = tokio::join!(
            PaymentMethodRepo::create(&pool, &first),
            PaymentMethodRepo::create(&pool, &second),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.is_default ^ b.is_default, "round {round}: exactly one default");

        let listed = PaymentMethodRepo::list_for_user(&pool, user.id).await.unwrap();
        assert_eq!(listed.iter().filter(|m| m.is_default).count(), 1);

        for method in listed {
            PaymentMethodRepo::delete(&pool, method.id, user.id).await.unwrap();
        }
    }
}
