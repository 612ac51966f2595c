mod common;

use actix_web::{test, App};
use chrono::{Duration, Utc};
use futures::future::join_all;
use pmblueprints_server::access::{period_start, Action, Tier, UsageCounters};
use pmblueprints_server::{configure, AppError};
use serde_json::Value;

use common::{bearer, Harness, ADMIN_TOKEN};

#[actix_web::test]
async fn admin_reset_is_idempotent_within_a_period() {
    let harness = Harness::new();
    let (pro, _) = harness.user("pro@example.com", Tier::Professional).await;
    let (individual, _) = harness.user("one-time@example.com", Tier::Individual).await;

    let last_month = period_start(Utc::now()) - Duration::days(3);
    for user in [&pro, &individual] {
        harness.store.set_last_reset(user.id, last_month).await;
        harness
            .store
            .set_usage(user.id, UsageCounters { downloads: 1, ai_suggestions: 2, ai_generations: 1 })
            .await;
    }

    let app = test::init_service(App::new().app_data(harness.data()).configure(configure)).await;

    let first = test::TestRequest::post()
        .uri("/api/admin/usage/reset")
        .insert_header(("X-Admin-Token", ADMIN_TOKEN))
        .send_request(&app)
        .await;
    assert_eq!(first.status(), 200);
    let report: Value = test::read_body_json(first).await;
    assert_eq!(report["reset"], 1);
    assert_eq!(report["skipped"], 1);
    assert_eq!(report["failed"], 0);

    let pro = harness.store.user(pro.id).await;
    assert_eq!(pro.usage(), UsageCounters::default());
    assert!(pro.last_usage_reset >= period_start(Utc::now()));

    // Lifetime allotments never roll over.
    let individual = harness.store.user(individual.id).await;
    assert_eq!(individual.downloads_this_month, 1);

    let second = test::TestRequest::post()
        .uri("/api/admin/usage/reset")
        .insert_header(("X-Admin-Token", ADMIN_TOKEN))
        .send_request(&app)
        .await;
    let report: Value = test::read_body_json(second).await;
    assert_eq!(report["reset"], 0);
}

#[actix_web::test]
async fn admin_reset_rejects_a_wrong_token() {
    let harness = Harness::new();
    let app = test::init_service(App::new().app_data(harness.data()).configure(configure)).await;

    let resp = test::TestRequest::post()
        .uri("/api/admin/usage/reset")
        .insert_header(("X-Admin-Token", "guess"))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 403);

    let resp = test::TestRequest::post().uri("/api/admin/usage/reset").send_request(&app).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
async fn individual_tier_draws_from_one_lifetime_pool() {
    let harness = Harness::new();
    let (user, token) = harness.user("one-time@example.com", Tier::Individual).await;

    let usage = harness.state.gate.consume(user.id, Action::Download).await.unwrap();
    assert_eq!(usage.downloads, 1);

    let user = harness.store.user(user.id).await;
    let err = harness.state.gate.check(&user, Action::AiGeneration).unwrap_err();
    assert!(matches!(err, AppError::AccessError(_)));

    let app = test::init_service(App::new().app_data(harness.data()).configure(configure)).await;
    let resp = test::TestRequest::get()
        .uri("/api/user/usage")
        .insert_header(bearer(&token))
        .send_request(&app)
        .await;
    let summary: Value = test::read_body_json(resp).await;

    assert_eq!(summary["tier"], "individual");
    let generations = summary["usage"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["action"] == "ai_generation")
        .unwrap();
    assert_eq!(generations["used"], 1);
    assert_eq!(generations["remaining"], 0);
    assert_eq!(generations["lifetime"], true);
}

#[actix_web::test]
async fn enterprise_passes_every_gate() {
    let harness = Harness::new();
    let (user, _) = harness.user("big@example.com", Tier::Enterprise).await;
    harness
        .store
        .set_usage(user.id, UsageCounters { downloads: 500, ai_suggestions: 500, ai_generations: 500 })
        .await;
    let user = harness.store.user(user.id).await;

    assert!(harness.state.gate.require_integrations(&user).is_ok());
    assert_eq!(harness.state.gate.check(&user, Action::Download).unwrap(), None);
    assert_eq!(harness.state.gate.check(&user, Action::AiGeneration).unwrap(), None);
}

#[actix_web::test]
async fn lower_tiers_lack_integrations() {
    let harness = Harness::new();
    for (email, tier) in [
        ("free@example.com", Tier::Free),
        ("one@example.com", Tier::Individual),
        ("pro@example.com", Tier::Professional),
    ] {
        let (user, _) = harness.user(email, tier).await;
        assert!(harness.state.gate.require_integrations(&user).is_err());
    }
}

#[actix_web::test]
async fn concurrent_consumption_never_exceeds_the_quota() {
    let harness = Harness::new();
    let (user, _) = harness.user("race@example.com", Tier::Professional).await;

    let attempts = (0..6).map(|_| harness.state.gate.consume(user.id, Action::Download));
    let results = join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert_eq!(harness.store.user(user.id).await.downloads_this_month, 2);
}
