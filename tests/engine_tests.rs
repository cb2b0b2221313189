mod common;

use std::fs;
use std::path::Path;

use common::{at, FakeSource, Fixture};
use stream_cache::config::PathMapping;
use stream_cache::{CleanupMode, Engine};

#[test]
fn test_copy_waits_for_delay() {
    let fx = Fixture::new();
    let config = fx.config();
    let movie = fx.write_bulk("Movies/X (2020)/X.mkv", b"movie");
    let cached = fx.cache_path("Movies/X (2020)/X.mkv");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();
    source.play(&movie);

    let report = engine.run_cycle(&mut source, at(0));
    assert_eq!(report.active, 1);
    assert_eq!(engine.stream_started_at(&movie), Some(at(0)));
    assert!(!cached.exists());

    engine.run_cycle(&mut source, at(29));
    assert!(!cached.exists(), "copy must wait out the full delay");

    let report = engine.run_cycle(&mut source, at(30));
    assert_eq!(report.promoted, 1);
    assert_eq!(fs::read(&cached).unwrap(), b"movie");
    assert!(fx.ledger().contains(&cached).unwrap());
}

#[test]
fn test_movie_brings_its_siblings() {
    let fx = Fixture::new();
    let config = fx.config();
    let movie = fx.write_bulk("Movies/Film/Film.mkv", b"part one");
    fx.write_bulk("Movies/Film/Film.part2.mkv", b"part two");
    fx.write_bulk("Movies/Film/Film.en.srt", b"subs");
    fx.write_bulk("Movies/Film/Other.mkv", b"unrelated");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();
    source.play(&movie);

    engine.run_cycle(&mut source, at(0));
    let report = engine.run_cycle(&mut source, at(30));

    assert_eq!(report.promoted, 3);
    assert!(fx.cache_path("Movies/Film/Film.mkv").exists());
    assert!(fx.cache_path("Movies/Film/Film.part2.mkv").exists());
    assert_eq!(fs::read(fx.cache_path("Movies/Film/Film.en.srt")).unwrap(), b"subs");
    assert!(!fx.cache_path("Movies/Film/Other.mkv").exists());
}

#[test]
fn test_series_trims_behind_and_promotes_ahead() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.cleanup_mode = CleanupMode::Smart;
    config.episode_keep_previous = 2;

    for ep in 1..=12 {
        let rel = format!("TV/Show/Season 01/Show.S01E{:02}.mkv", ep);
        let body = format!("episode {}", ep);
        fx.write_bulk(&rel, body.as_bytes());
        if ep <= 10 {
            let cached = fx.write_cache(&rel, body.as_bytes());
            fx.ledger().add(&cached).unwrap();
        }
    }
    let playing = fx.bulk_path("TV/Show/Season 01/Show.S01E10.mkv");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();
    source.play(&playing);

    engine.run_cycle(&mut source, at(0));
    let report = engine.run_cycle(&mut source, at(30));

    for ep in 1..=12 {
        let cached = fx.cache_path(&format!("TV/Show/Season 01/Show.S01E{:02}.mkv", ep));
        assert_eq!(cached.exists(), ep >= 8, "episode {}", ep);
        assert!(fx
            .bulk_path(&format!("TV/Show/Season 01/Show.S01E{:02}.mkv", ep))
            .exists());
    }
    assert_eq!(report.demoted, 7);
    assert_eq!(report.promoted, 2);
    assert_eq!(fx.ledger().load().unwrap().len(), 5);
}

#[test]
fn test_series_without_smart_keeps_earlier_episodes() {
    let fx = Fixture::new();
    let config = fx.config();
    for ep in 1..=4 {
        let rel = format!("TV/Show/Season 01/Show.S01E{:02}.mkv", ep);
        fx.write_bulk(&rel, b"ep");
    }
    fx.write_cache("TV/Show/Season 01/Show.S01E01.mkv", b"ep");
    let playing = fx.bulk_path("TV/Show/Season 01/Show.S01E04.mkv");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();
    source.play(&playing);

    engine.run_cycle(&mut source, at(0));
    let report = engine.run_cycle(&mut source, at(30));

    assert_eq!(report.demoted, 0);
    assert_eq!(report.promoted, 1);
    assert!(fx.cache_path("TV/Show/Season 01/Show.S01E01.mkv").exists());
    assert!(!fx.cache_path("TV/Show/Season 01/Show.S01E03.mkv").exists());
}

#[test]
fn test_excluded_and_foreign_streams_are_ignored() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.exclude_dirs = vec!["Kids".to_string()];
    let excluded = fx.write_bulk("Kids/Cartoon.mkv", b"cartoon");
    let not_media = fx.write_bulk("Music/Album.flac", b"music");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();
    source.play(&excluded);
    source.play(&not_media);
    source.play(Path::new("/somewhere/else/Movie.mkv"));

    let report = engine.run_cycle(&mut source, at(0));
    assert_eq!(report.active, 0);
    engine.run_cycle(&mut source, at(60));

    assert!(!fx.cache_path("Kids/Cartoon.mkv").exists());
    assert!(!fx.cache_path("Music/Album.flac").exists());
    assert!(fx.ledger().load().unwrap().is_empty());
}

#[test]
fn test_container_paths_are_mapped() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.path_mappings = vec![PathMapping {
        container: "/data/movies".to_string(),
        host: fx.bulk_path("Movies").to_string_lossy().into_owned(),
    }];
    let movie = fx.write_bulk("Movies/X.mkv", b"x");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();
    source.play(Path::new("/data/movies/X.mkv"));

    let report = engine.run_cycle(&mut source, at(0));
    assert_eq!(report.active, 1);
    assert_eq!(engine.stream_started_at(&movie), Some(at(0)));

    engine.run_cycle(&mut source, at(30));
    assert!(fx.cache_path("Movies/X.mkv").exists());
}

#[test]
fn test_stopped_stream_restarts_its_timer() {
    let fx = Fixture::new();
    let config = fx.config();
    let movie = fx.write_bulk("Movies/X.mkv", b"x");
    let cached = fx.cache_path("Movies/X.mkv");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();

    source.play(&movie);
    engine.run_cycle(&mut source, at(0));
    source.stop_all();
    engine.run_cycle(&mut source, at(20));
    assert_eq!(engine.stream_started_at(&movie), None);

    source.play(&movie);
    engine.run_cycle(&mut source, at(25));
    assert_eq!(engine.stream_started_at(&movie), Some(at(25)));
    engine.run_cycle(&mut source, at(40));
    assert!(!cached.exists());
    engine.run_cycle(&mut source, at(55));
    assert!(cached.exists());
}

#[test]
fn test_watched_movie_is_evicted_after_delay() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.cleanup_mode = CleanupMode::Smart;
    config.movie_delete_delay_secs = 60;
    let movie = fx.write_bulk("Movies/X.mkv", b"x");
    let cached = fx.cache_path("Movies/X.mkv");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();

    source.play(&movie);
    engine.run_cycle(&mut source, at(0));
    engine.run_cycle(&mut source, at(30));
    assert!(cached.exists());

    source.stop_all();
    source.mark_watched(&movie);
    let report = engine.run_cycle(&mut source, at(40));
    assert_eq!(report.queued, 1);
    assert_eq!(engine.deletion_queue().queued_at(&cached), Some(at(40)));

    engine.run_cycle(&mut source, at(100));
    assert!(cached.exists(), "delay has not fully elapsed");

    let report = engine.run_cycle(&mut source, at(101));
    assert_eq!(report.demoted, 1);
    assert!(!cached.exists());
    assert!(movie.exists());
    assert!(engine.deletion_queue().is_empty());
    assert!(fx.ledger().load().unwrap().is_empty());
}

#[test]
fn test_resumed_stream_cancels_eviction() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.cleanup_mode = CleanupMode::Smart;
    config.movie_delete_delay_secs = 60;
    let movie = fx.write_bulk("Movies/X.mkv", b"x");
    let cached = fx.cache_path("Movies/X.mkv");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();

    source.play(&movie);
    engine.run_cycle(&mut source, at(0));
    engine.run_cycle(&mut source, at(30));
    source.stop_all();
    source.mark_watched(&movie);
    engine.run_cycle(&mut source, at(40));
    assert!(engine.deletion_queue().contains(&cached));

    source.play(&movie);
    engine.run_cycle(&mut source, at(50));
    assert!(engine.deletion_queue().is_empty());

    engine.run_cycle(&mut source, at(500));
    assert!(cached.exists());
}

#[test]
fn test_unwatched_stop_is_not_queued() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.cleanup_mode = CleanupMode::Smart;
    let movie = fx.write_bulk("Movies/X.mkv", b"x");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();

    source.play(&movie);
    engine.run_cycle(&mut source, at(0));
    engine.run_cycle(&mut source, at(30));
    source.stop_all();
    let report = engine.run_cycle(&mut source, at(40));

    assert_eq!(report.queued, 0);
    assert!(engine.deletion_queue().is_empty());
}

fn season_fixture() -> Fixture {
    let fx = Fixture::new();
    for ep in 1..=5 {
        fx.write_bulk(&format!("TV/Show/Season 01/Show.S01E{:02}.mkv", ep), b"ep");
    }
    for ep in 3..=5 {
        fx.write_cache(&format!("TV/Show/Season 01/Show.S01E{:02}.mkv", ep), b"ep");
    }
    fx.write_cache("TV/Show/Season 01/cover.jpg", b"jpg");
    fx
}

#[test]
fn test_season_finale_queues_cached_season() {
    let fx = season_fixture();
    let mut config = fx.config();
    config.cleanup_mode = CleanupMode::Smart;
    let finale = fx.bulk_path("TV/Show/Season 01/Show.S01E05.mkv");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();

    source.play(&finale);
    engine.run_cycle(&mut source, at(0));
    source.stop_all();
    source.mark_watched(&finale);
    let report = engine.run_cycle(&mut source, at(10));

    assert_eq!(report.queued, 4);
    let queue = engine.deletion_queue();
    for rel in [
        "Show.S01E03.mkv",
        "Show.S01E04.mkv",
        "Show.S01E05.mkv",
        "cover.jpg",
    ] {
        assert!(queue.contains(&fx.cache_path(&format!("TV/Show/Season 01/{}", rel))), "{}", rel);
    }
}

#[test]
fn test_mid_season_episode_is_not_queued() {
    let fx = season_fixture();
    let mut config = fx.config();
    config.cleanup_mode = CleanupMode::Smart;
    let episode = fx.bulk_path("TV/Show/Season 01/Show.S01E03.mkv");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();

    source.play(&episode);
    engine.run_cycle(&mut source, at(0));
    source.stop_all();
    source.mark_watched(&episode);
    let report = engine.run_cycle(&mut source, at(10));

    assert_eq!(report.queued, 0);
    assert!(engine.deletion_queue().is_empty());
}

#[test]
fn test_days_mode_evicts_old_entries() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.cleanup_mode = CleanupMode::Days;
    config.cache_max_days = 7;
    config.exclude_dirs = vec!["Kids".to_string()];

    let old = fx.write_cache("Movies/Old.mkv", b"old");
    let kept = fx.write_cache("Kids/Cartoon.mkv", b"kids");
    let fresh_at = 1_000 + 7 * 86_400;
    let fresh = fx.write_cache("Movies/Fresh.mkv", b"fresh");
    fs::write(
        fx.ledger().path(),
        format!(
            "{}|1000\n{}|1000\n{}|{}\n",
            old.display(),
            kept.display(),
            fresh.display(),
            fresh_at
        ),
    )
    .unwrap();

    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();
    let report = engine.run_cycle(&mut source, at(1_000 + 8 * 86_400));

    assert_eq!(report.demoted, 1);
    assert!(!old.exists());
    assert_eq!(fs::read(fx.bulk_path("Movies/Old.mkv")).unwrap(), b"old");
    assert!(kept.exists(), "excluded directories are never evicted");
    assert!(fresh.exists());

    let entries = fx.ledger().load().unwrap();
    assert!(!entries.contains_key(&old));
    assert!(entries.contains_key(&kept));
    assert!(entries.contains_key(&fresh));
}

#[test]
fn test_days_sweep_runs_hourly() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.cleanup_mode = CleanupMode::Days;
    config.cache_max_days = 1;
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();
    let start = 10 * 86_400;

    engine.run_cycle(&mut source, at(start));

    let stale = fx.write_cache("Movies/Stale.mkv", b"s");
    fs::write(fx.ledger().path(), format!("{}|0\n", stale.display())).unwrap();

    engine.run_cycle(&mut source, at(start + 1_800));
    assert!(stale.exists(), "sweep ran again inside the hour");

    let report = engine.run_cycle(&mut source, at(start + 3_600));
    assert_eq!(report.demoted, 1);
    assert!(!stale.exists());
}

#[test]
fn test_none_mode_never_evicts() {
    let fx = Fixture::new();
    let config = fx.config();
    let movie = fx.write_bulk("Movies/X.mkv", b"x");
    let cached = fx.cache_path("Movies/X.mkv");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();

    source.play(&movie);
    engine.run_cycle(&mut source, at(0));
    engine.run_cycle(&mut source, at(30));
    source.stop_all();
    source.mark_watched(&movie);
    let report = engine.run_cycle(&mut source, at(40));
    engine.run_cycle(&mut source, at(40 + 30 * 86_400));

    assert_eq!(report.queued, 0);
    assert!(cached.exists());
    assert!(fx.ledger().contains(&cached).unwrap());
}

#[test]
fn test_reload_keeps_stream_timers() {
    let fx = Fixture::new();
    let config = fx.config();
    let movie = fx.write_bulk("Movies/X.mkv", b"x");
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();

    source.play(&movie);
    engine.run_cycle(&mut source, at(0));

    let mut reloaded = config.clone();
    reloaded.copy_delay_secs = 5;
    engine.reload_with(reloaded.clone(), fx.mover(&reloaded));
    assert_eq!(engine.stream_started_at(&movie), Some(at(0)));
    assert_eq!(engine.config().copy_delay_secs, 5);

    let report = engine.run_cycle(&mut source, at(10));
    assert_eq!(report.promoted, 1);
    assert!(fx.cache_path("Movies/X.mkv").exists());
}

#[test]
fn test_out_of_range_durations_do_not_panic() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.cleanup_mode = CleanupMode::Days;
    config.copy_delay_secs = u64::MAX;
    config.cache_max_days = u64::MAX;
    let movie = fx.write_bulk("Movies/X.mkv", b"x");
    let old = fx.write_bulk("Movies/Old.mkv", b"old");
    let cached = fx.write_cache("Movies/Old.mkv", b"old");
    fs::write(fx.ledger().path(), format!("{}|0\n", cached.display())).unwrap();
    let mut engine = Engine::with_mover(config.clone(), fx.mover(&config));
    let mut source = FakeSource::default();

    source.play(&movie);
    source.play(&old);
    engine.run_cycle(&mut source, at(0));
    let report = engine.run_cycle(&mut source, at(365 * 86_400));

    assert_eq!(report.promoted, 0);
    assert_eq!(report.demoted, 0);
    assert!(!fx.cache_path("Movies/X.mkv").exists());
    assert!(cached.exists());

    let mut smart = config.clone();
    smart.cleanup_mode = CleanupMode::Smart;
    smart.movie_delete_delay_secs = u64::MAX;
    engine.reload_with(smart.clone(), fx.mover(&smart));
    source.stop_all();
    source.mark_watched(&old);
    let report = engine.run_cycle(&mut source, at(366 * 86_400));
    assert_eq!(report.queued, 1);

    let report = engine.run_cycle(&mut source, at(2 * 365 * 86_400));
    assert_eq!(report.demoted, 0);
    assert!(engine.deletion_queue().contains(&cached));
    assert!(cached.exists());
}
