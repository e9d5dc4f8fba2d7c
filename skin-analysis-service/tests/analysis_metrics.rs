//! In-flight accounting for analyses. Kept in its own test binary because
//! the gauge is process-wide.

use skin_analysis_service::models::ImageMimeType;
use skin_analysis_service::services::metrics::{init_metrics, ANALYSES_IN_FLIGHT};
use skin_analysis_service::services::providers::mock::{MockImageProvider, MockVisionProvider};
use skin_analysis_service::services::AnalysisService;
use std::sync::Arc;
use std::time::Duration;

fn full_in_flight() -> i64 {
    ANALYSES_IN_FLIGHT
        .get()
        .unwrap()
        .with_label_values(&["full"])
        .get()
}

#[tokio::test]
async fn cancelled_analysis_leaves_no_in_flight_count() {
    init_metrics();
    let service = AnalysisService::new(
        Arc::new(MockVisionProvider::new(true)),
        Arc::new(MockImageProvider::new(true).with_reverse_latency()),
    );

    let outcome = tokio::time::timeout(
        Duration::from_millis(5),
        service.get_analysis_and_healing_visuals("AAAA", ImageMimeType::Jpeg),
    )
    .await;

    assert!(outcome.is_err(), "analysis should still be running");
    assert_eq!(full_in_flight(), 0);

    service
        .get_analysis_and_healing_visuals("AAAA", ImageMimeType::Jpeg)
        .await
        .unwrap();
    assert_eq!(full_in_flight(), 0);
}
