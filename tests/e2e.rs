//! End-to-end scenarios against a stub HTTP server (S1-S6 in the design doc).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tile_downloader::task::{OutputFormat, Task, TaskConfig};
use tile_downloader::tilecover::{BoundingBoxCover, TileCover};
use tile_downloader::tilemap::{BoundingBox, Layer, TileFormat, TileMap, TileSchema};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn small_region() -> BoundingBox {
    // A modest slice of the globe, enough to cover a handful of tiles at
    // z=3 without pinning exact tile indices to the projection formula.
    BoundingBox {
        min_lon: -22.5,
        min_lat: 40.9799,
        max_lon: 0.0,
        max_lat: 66.5133,
    }
}

fn map_for(name: &str, format: TileFormat, bounds: BoundingBox, min_zoom: u8, max_zoom: u8) -> TileMap {
    TileMap {
        name: name.to_string(),
        format,
        schema: TileSchema::Xyz,
        bounds,
        min_zoom,
        max_zoom,
        json: String::new(),
    }
}

fn layers_for(bounds: BoundingBox, min_zoom: u8, max_zoom: u8, url_template: &str) -> Vec<Layer> {
    let cover = BoundingBoxCover::new(bounds);
    (min_zoom..=max_zoom)
        .map(|zoom| Layer {
            zoom,
            url_template: url_template.to_string(),
            geometry: bounds,
            count: cover.count(zoom),
        })
        .collect()
}

fn run_task_with(map: TileMap, config: TaskConfig) -> Task {
    Task::new(map, config)
}

async fn run(task: &Task) {
    task.run(|layer| {
        let cover = BoundingBoxCover::new(layer.geometry);
        Box::new(cover) as Box<dyn TileCover>
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn s1_small_area_xyz_filesystem() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(|req: &wiremock::Request| {
            // Echo back "T<z>/<x>/<y>" based on the path the templater built.
            let body = format!("T{}", req.url.path().trim_start_matches('/'));
            ResponseTemplate::new(200).set_body_bytes(body.into_bytes())
        })
        .mount(&server)
        .await;

    let bounds = small_region();
    let out_dir = tempfile::tempdir().unwrap();
    let name = "region";

    let url_template = format!("{}/{{z}}/{{x}}/{{y}}", server.uri());
    let map = map_for(name, TileFormat::Png, bounds, 3, 3);
    let expected_count = BoundingBoxCover::new(bounds).count(3);

    let config = TaskConfig {
        layers: layers_for(bounds, 3, 3, &url_template),
        output_directory: out_dir.path().to_str().unwrap().to_string(),
        output_format: OutputFormat::Filesystem,
        skip_existing: false,
        resume: false,
        worker_count: 4,
        save_pipe_size: 8,
        merge_buf_size: 8,
        inter_request_delay_ms: 0,
    };

    let task = run_task_with(map, config);
    run(&task).await;

    // Walk the written tree and check every file holds the body templated
    // for its own coordinate, rather than hard-coding expected tile indices.
    let zoom_dir = out_dir.path().join(name).join("3");
    let mut tile_files = 0;
    for x_entry in std::fs::read_dir(&zoom_dir).unwrap() {
        let x_entry = x_entry.unwrap();
        let x: u32 = x_entry.file_name().to_str().unwrap().parse().unwrap();
        for y_entry in std::fs::read_dir(x_entry.path()).unwrap() {
            let y_entry = y_entry.unwrap();
            let y: u32 = y_entry
                .file_name()
                .to_str()
                .unwrap()
                .trim_end_matches(".png")
                .parse()
                .unwrap();
            let contents = std::fs::read_to_string(y_entry.path()).unwrap();
            assert_eq!(contents, format!("T3/{x}/{y}"));
            tile_files += 1;
        }
    }
    assert_eq!(tile_files, expected_count);
}

#[tokio::test]
async fn s4_skip_existing_on_mbtiles() {
    let server = MockServer::start().await;
    let request_count = Arc::new(AtomicUsize::new(0));
    let counter = request_count.clone();
    Mock::given(method("GET"))
        .respond_with(move |_req: &wiremock::Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_bytes(b"tiledata".to_vec())
        })
        .mount(&server)
        .await;

    let bounds = BoundingBox {
        min_lon: -180.0,
        min_lat: -85.0,
        max_lon: 180.0,
        max_lat: 85.0,
    };
    let out_dir = tempfile::tempdir().unwrap();
    let name = "world";
    let url_template = format!("{}/{{z}}/{{x}}/{{y}}", server.uri());

    let map = map_for(name, TileFormat::Png, bounds, 1, 1);
    let cover = BoundingBoxCover::new(bounds);
    assert_eq!(cover.count(1), 4);

    // Pre-populate the mbtiles file with tile (1,0,0) before the task runs.
    {
        let path = format!("{}/{}.mbtiles", out_dir.path().to_str().unwrap(), name);
        let pre = tile_downloader::tile_store::MbtilesStore::open(&path, &map, true)
            .await
            .unwrap();
        use tile_downloader::coord::TileCoord;
        use tile_downloader::tile_store::TileStore;
        pre.insert(TileCoord::new(1, 0, 0), bytes::Bytes::from_static(b"preexisting"))
            .await
            .unwrap();
    }

    let config = TaskConfig {
        layers: layers_for(bounds, 1, 1, &url_template),
        output_directory: out_dir.path().to_str().unwrap().to_string(),
        output_format: OutputFormat::Mbtiles,
        skip_existing: true,
        resume: false,
        worker_count: 4,
        save_pipe_size: 8,
        merge_buf_size: 8,
        inter_request_delay_ms: 0,
    };

    let task = run_task_with(map, config);
    run(&task).await;

    assert_eq!(request_count.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn s5_worker_bound_never_exceeded() {
    let server = MockServer::start().await;

    // `set_delay` holds each response open without blocking an executor
    // thread. With a worker bound of 2 over 4 tiles, the run can finish no
    // faster than 2 delay-rounds; an unbounded pool would finish in about
    // one round.
    let delay = std::time::Duration::from_millis(60);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()).set_delay(delay))
        .mount(&server)
        .await;

    let bounds = BoundingBox {
        min_lon: -180.0,
        min_lat: -85.0,
        max_lon: 180.0,
        max_lat: 85.0,
    };
    let out_dir = tempfile::tempdir().unwrap();
    let url_template = format!("{}/{{z}}/{{x}}/{{y}}", server.uri());
    let map = map_for("bound", TileFormat::Png, bounds, 1, 1);
    assert_eq!(BoundingBoxCover::new(bounds).count(1), 4);

    let config = TaskConfig {
        layers: layers_for(bounds, 1, 1, &url_template),
        output_directory: out_dir.path().to_str().unwrap().to_string(),
        output_format: OutputFormat::Filesystem,
        skip_existing: false,
        resume: false,
        worker_count: 2,
        save_pipe_size: 8,
        merge_buf_size: 8,
        inter_request_delay_ms: 0,
    };

    let task = run_task_with(map, config);
    let start = std::time::Instant::now();
    run(&task).await;
    let elapsed = start.elapsed();

    // 4 tiles at a bound of 2 takes at least 2 delay-rounds; a worker pool
    // that let all 4 run at once would finish in roughly one round.
    assert!(
        elapsed >= delay * 2 - std::time::Duration::from_millis(20),
        "elapsed {elapsed:?} too short for a worker bound of 2"
    );
}

#[tokio::test]
async fn s3_resume_skips_already_downloaded_tiles() {
    let server = MockServer::start().await;
    let request_count = Arc::new(AtomicUsize::new(0));
    let counter = request_count.clone();
    Mock::given(method("GET"))
        .respond_with(move |_req: &wiremock::Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_bytes(b"tile".to_vec())
        })
        .mount(&server)
        .await;

    let bounds = BoundingBox {
        min_lon: -180.0,
        min_lat: -85.0,
        max_lon: 180.0,
        max_lat: 85.0,
    };
    let out_dir = tempfile::tempdir().unwrap();
    let name = "resumable";
    let url_template = format!("{}/{{z}}/{{x}}/{{y}}", server.uri());
    let map = map_for(name, TileFormat::Png, bounds, 1, 1);
    assert_eq!(BoundingBoxCover::new(bounds).count(1), 4);

    // Simulate an interruption after 2 of 4 tiles: write those 2 to the tile
    // store first, then mark them in the progress store, so the progress
    // entries only ever point at tiles that actually made it to disk.
    {
        use tile_downloader::coord::TileCoord;
        use tile_downloader::progress::ProgressStore;
        use tile_downloader::tile_store::{FilesystemStore, TileStore};

        let root = format!("{}/{}", out_dir.path().to_str().unwrap(), name);
        let fs_store = FilesystemStore::new(root, "png");
        fs_store
            .insert(TileCoord::new(1, 0, 0), bytes::Bytes::from_static(b"already-there"))
            .await
            .unwrap();
        fs_store
            .insert(TileCoord::new(1, 0, 1), bytes::Bytes::from_static(b"already-there"))
            .await
            .unwrap();

        let path = format!("{}/{}.progress.db", out_dir.path().to_str().unwrap(), name);
        let store = ProgressStore::open(&path, true).await.unwrap();
        store
            .batch_mark(&[TileCoord::new(1, 0, 0), TileCoord::new(1, 0, 1)])
            .await
            .unwrap();
    }

    let config = TaskConfig {
        layers: layers_for(bounds, 1, 1, &url_template),
        output_directory: out_dir.path().to_str().unwrap().to_string(),
        output_format: OutputFormat::Filesystem,
        skip_existing: false,
        resume: true,
        worker_count: 4,
        save_pipe_size: 8,
        merge_buf_size: 8,
        inter_request_delay_ms: 0,
    };

    let task = run_task_with(map, config);
    run(&task).await;

    // Only the 2 tiles not already in the DownloadedSet should have been
    // fetched from the server.
    assert_eq!(request_count.load(Ordering::SeqCst), 2);
    for (x, y) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        let path = out_dir.path().join(name).join("1").join(x.to_string()).join(format!("{y}.png"));
        assert!(path.exists(), "missing {path:?}");
    }
}
