mod common;

use common::{drain, fixed_time, frame, harness, status};
use forecast_host::broadcast::Event;
use forecast_host::ingest::LineOutcome;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn gathers_then_forecasts_with_reading_first() {
    let mut h = harness(3, 7, 5, &[]);
    let mut sub = h.broadcaster.subscribe();

    for (i, temp) in [20.0, 21.0].into_iter().enumerate() {
        let outcome = h.pipeline.process_line(frame(temp).as_bytes()).await;
        assert_eq!(outcome, LineOutcome::Gathering { count: i + 1, capacity: 3 });

        let events = drain(&mut sub);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Event::Reading(r) if r.temp == temp));
        assert_eq!(events[1], status(&format!("Gathering data... {}/3", i + 1)));
    }

    let outcome = h.pipeline.process_line(frame(22.5).as_bytes()).await;
    assert_eq!(outcome, LineOutcome::Forecast);

    let events = drain(&mut sub);
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], Event::Reading(r) if r.temp == 22.5));
    let Event::Forecast { points } = &events[1] else {
        panic!("expected forecast, got {:?}", events[1]);
    };
    assert_eq!(events[2], status("Live prediction active."));

    assert_eq!(points.len(), 5);
    assert!(points.iter().all(|p| p.temp == 22.5 && p.precipitation == 0.0 && p.aqi == 40));
    assert_eq!(points[0].at, fixed_time() + chrono::Duration::hours(2));
    for pair in points.windows(2) {
        assert_eq!(pair[1].at - pair[0].at, chrono::Duration::hours(2));
    }
    let labels: Vec<_> = points.iter().map(|p| p.time.as_str()).collect();
    assert_eq!(labels, ["12:00", "14:00", "16:00", "18:00", "20:00"]);

    let state = h.state.read().await;
    assert_eq!(state.readings_processed, 3);
    assert_eq!(state.window_len, 3);
    assert_eq!(state.latest_forecast.as_ref().map(Vec::len), Some(5));
}

#[tokio::test]
async fn every_reading_after_fill_forecasts() {
    let mut h = harness(2, 7, 5, &[]);
    for i in 0..6 {
        let outcome = h.pipeline.process_line(frame(f64::from(i)).as_bytes()).await;
        if i == 0 {
            assert!(matches!(outcome, LineOutcome::Gathering { .. }));
        } else {
            assert_eq!(outcome, LineOutcome::Forecast);
        }
        assert!(h.window.len() <= 2);
    }
}

#[tokio::test]
async fn batch_capped_at_model_horizon() {
    let mut h = harness(1, 3, 5, &[]);
    let mut sub = h.broadcaster.subscribe();
    h.pipeline.process_line(frame(19.0).as_bytes()).await;
    let forecast = drain(&mut sub)
        .into_iter()
        .find_map(|e| match e {
            Event::Forecast { points } => Some(points),
            _ => None,
        })
        .expect("forecast event");
    assert_eq!(forecast.len(), 3);
}

#[tokio::test]
async fn malformed_line_is_skipped_without_touching_the_window() {
    let mut h = harness(3, 7, 5, &[]);
    let mut sub = h.broadcaster.subscribe();

    h.pipeline.process_line(frame(20.0).as_bytes()).await;
    h.pipeline.process_line(frame(21.0).as_bytes()).await;
    drain(&mut sub);

    let garbage: [&[u8]; 4] = [
        b"{\"temp\": 20.0, \"humid",
        b"not json at all\n",
        b"{\"humidity\": 1, \"pressure\": 2, \"rain_analog\": 3, \"light_intensity\": 4, \"aqi\": 5}\n",
        b"\xff\xfe\n",
    ];
    for line in garbage {
        assert_eq!(h.pipeline.process_line(line).await, LineOutcome::Skipped);
    }
    assert_eq!(h.window.len(), 2);
    assert!(drain(&mut sub).is_empty());

    assert_eq!(
        h.pipeline.process_line(frame(22.0).as_bytes()).await,
        LineOutcome::Forecast
    );
    let snapshot = h.window.snapshot();
    let temps: Vec<f64> = snapshot.iter().map(|v| v.0[0]).collect();
    assert_eq!(temps, [20.0, 21.0, 22.0]);

    let state = h.state.read().await;
    assert_eq!(state.decode_failures, 4);
    assert_eq!(state.readings_processed, 3);
}

#[tokio::test]
async fn failed_inference_keeps_window_and_recovers() {
    // 24 readings fill the window (forecaster call 1), the 25th reading makes
    // call 2 which fails, the 26th forecasts again
    let mut h = harness(24, 7, 5, &[2]);
    let mut sub = h.broadcaster.subscribe();

    for i in 1..=24 {
        h.pipeline.process_line(frame(f64::from(i)).as_bytes()).await;
    }
    assert_eq!(h.window.len(), 24);
    drain(&mut sub);

    let outcome = h.pipeline.process_line(frame(25.0).as_bytes()).await;
    assert_eq!(outcome, LineOutcome::InferenceFailed);
    assert_eq!(h.window.len(), 24);
    let temps: Vec<f64> = h.window.snapshot().iter().map(|v| v.0[0]).collect();
    let expected: Vec<f64> = (2..=25).map(f64::from).collect();
    assert_eq!(temps, expected);

    let events = drain(&mut sub);
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], Event::Reading(r) if r.temp == 25.0));
    assert_eq!(events[1], status("Prediction failed; will retry on next reading."));
    assert_eq!(h.state.read().await.inference_failures, 1);

    let outcome = h.pipeline.process_line(frame(26.0).as_bytes()).await;
    assert_eq!(outcome, LineOutcome::Forecast);
    let events = drain(&mut sub);
    assert!(matches!(&events[1], Event::Forecast { points } if points[0].temp == 26.0));
}

#[tokio::test]
async fn pause_returns_early_when_cancelled() {
    let h = harness(3, 7, 5, &[]);
    let cancel = CancellationToken::new();
    assert!(h.pipeline.pause(&cancel).await);
    cancel.cancel();
    assert!(!h.pipeline.pause(&cancel).await);
}
