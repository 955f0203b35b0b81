//! Submit a few parking traces and print the resulting heatmap.
//!
//! Run with: cargo run --example submit_trace

use chrono::NaiveDate;
use parkpal_engine::{
    EngineConfig, GpsPoint, HeatmapConfig, InMemorySegmentStore, InMemoryUserStore, ParkingEngine,
    PassthroughSnapper, PointOutcome, User,
};

#[tokio::main]
async fn main() {
    let users = InMemoryUserStore::new();
    users.insert_user(User::new("alice")).await;
    users.insert_user(User::new("bob")).await;

    let engine = ParkingEngine::new(
        InMemorySegmentStore::new(),
        users,
        PassthroughSnapper,
        EngineConfig::default(),
    );

    // Tuesday afternoon
    let at = NaiveDate::from_ymd_opt(2024, 3, 5)
        .and_then(|d| d.and_hms_opt(15, 0, 0))
        .expect("valid timestamp");

    // Alice circles the block and parks on Forbes Ave
    let alice_trace = vec![
        GpsPoint::new(40.4406, -79.9959),
        GpsPoint::new(40.4406, -79.9959),
        GpsPoint::new(40.4410, -79.9962),
        GpsPoint::new(40.4415, -79.9966),
        GpsPoint::new(40.4420, -79.9970),
    ];

    // Bob drives past Alice's spot and parks further along
    let bob_trace = vec![
        GpsPoint::new(40.4415, -79.9966),
        GpsPoint::new(40.4420, -79.9970),
        GpsPoint::new(40.4425, -79.9975),
    ];

    println!("ParkPal trace processing\n");

    for (user, trace) in [("alice", &alice_trace), ("bob", &bob_trace)] {
        match engine.submit_parking_trace_at(user, trace, at).await {
            Ok(summary) => {
                println!("{}: {} unique points, level_up={}", user, summary.points.len(), summary.level_up);
                for p in &summary.points {
                    let detail = match p.outcome {
                        PointOutcome::Created { likelihood } => format!("created @ {:.2}", likelihood),
                        PointOutcome::Blended { likelihood } => format!("blended -> {:.2}", likelihood),
                        PointOutcome::Skipped => "skipped".to_string(),
                    };
                    println!(
                        "   ({:.4}, {:.4}) {:<13} segment #{} {}",
                        p.point.latitude,
                        p.point.longitude,
                        p.action.as_str(),
                        p.segment_id,
                        detail
                    );
                }
                println!();
            }
            Err(e) => println!("{}: failed ({})\n", user, e.kind()),
        }
    }

    println!("Heatmap weights:");
    if let Ok(weights) = engine.get_heatmap_weights(at).await {
        for w in weights {
            println!("   ({:.4}, {:.4}) weight {:.3}", w.lat, w.lng, w.weight);
        }
    }

    if let Ok(grid) = engine.get_heatmap_grid(at, &HeatmapConfig::default()).await {
        println!("\nGrid: {} cells over {}x{}", grid.cells.len(), grid.grid_rows, grid.grid_cols);
    }

    if let Ok(prediction) = engine.get_segment_prediction(40.4410, -79.9960, at).await {
        println!(
            "\nPrediction near (40.4410, -79.9960): {:.3} from {} segments",
            prediction.likelihood, prediction.segment_count
        );
    }
}
