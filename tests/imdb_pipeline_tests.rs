// End-to-end tests for the IMDb list import
// A small but faithfully laid out set of dumps is sorted, joined and committed

use flatjoin::imdb::{Dataset, JsonLinesSink, Loader, MediaIdEntry, MediaKind, TitleRecord};
use flatjoin::{Error, Options, Phase};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SHOW: &str = "\"Show\" (2000)";
const PILOT: &str = "\"Show\" (2000) {Pilot (#1.1)}";
const FINALE: &str = "\"Show\" (2000) {Finale (#1.2)}";
const ALPHA: &str = "Alpha (2001)";
const ZETA: &str = "Zeta (1999)";

fn dashes(n: usize) -> String {
    "-".repeat(n)
}

fn rating_line(distribution: &str, votes: u64, rank: &str, title: &str) -> String {
    let prefix = format!("      {} {:>8}  {:>3}  ", distribution, votes, rank);
    assert_eq!(prefix.len(), 32);
    format!("{}{}", prefix, title)
}

fn write_dumps(dir: &Path, with_media_ids: bool) -> anyhow::Result<()> {
    let movies = format!(
        "CRC: 0x1A2B3C4D  File: movies.list\n\nMOVIES LIST\n===========\n\n\
         {SHOW}\t\t\t\t2000-2002\n\
         {PILOT}\t\t2000\n\
         {ZETA}\t\t\t\t1999\n\
         {ALPHA}\t\t\t\t2001\n\
         {FINALE}\t\t2002\n\
         \n{}\n\nCopyright notice\n",
        dashes(80)
    );
    fs::write(dir.join("movies.list"), movies)?;

    let genres = format!(
        "THE GENRES LIST\n\n8: THE GENRES LIST\n==================\n\n\
         {ALPHA}\t\t\t\tDrama\n\
         {SHOW}\t\t\t\tSci-Fi\n\
         {ALPHA}\t\t\t\tComedy\n\
         {ZETA}\t\t\t\tHorror\n\
         {ALPHA}\t\t\t\tDrama\n"
    );
    fs::write(dir.join("genres.list"), genres)?;

    let aka = format!(
        "AKA TITLES LIST\n===============\n\n\n\n\
         {SHOW}\n   (aka Le Show (2000))\t(France)\n\n\
         {ALPHA}\n   (aka Alfa (2001))\t(Italy)\n   (aka Alpha! (2001))\t(USA)\t(working title)\n\
         \n{}\n",
        dashes(77)
    );
    fs::write(dir.join("aka-titles.list"), aka)?;

    let ratings = format!(
        "MOVIE RATINGS REPORT\n\nNew  Distribution  Votes  Rank  Title\n\
         {}\n{}\n\n{}\n\nREPORT FORMAT\n=============\n\nlegend\n",
        rating_line("0000001222", 1234, "7.9", ZETA),
        rating_line("00000.1*11", 56, "6.1", ALPHA),
        dashes(78)
    );
    fs::write(dir.join("ratings.list"), ratings)?;

    let separator = dashes(79);
    let plots = format!(
        "PLOT SUMMARIES LIST\n===================\n\n\
         {separator}\nMV: {ZETA}\n\nPL: Something lurks.\nPL: It waits.\n\nBY: Someone\n\n\
         {separator}\nMV: {ALPHA}\n\nPL: A story begins.\n\nBY: Another\n"
    );
    fs::write(dir.join("plot.list"), plots)?;

    if with_media_ids {
        fs::write(dir.join("media-ids.tsv"), format!("{ZETA}\tid-zeta\n{ALPHA}\tid-alpha\n"))?;
    }
    Ok(())
}

fn find<'a>(records: &'a [TitleRecord], title: &str) -> &'a TitleRecord {
    records.iter().find(|r| r.title() == title).unwrap()
}

/// Test the full import: every title once, in key order, with its
/// secondary data attached and episodes linked to their series
#[test]
fn test_full_import() -> anyhow::Result<()> {
    env_logger::try_init().ok();
    let source = TempDir::new()?;
    let work = TempDir::new()?;
    write_dumps(source.path(), true)?;

    let options = Options::new().chunk_size(64).sink_batch_size(2);
    let loader = Loader::new(source.path(), work.path(), options)?;

    let mut titles: Vec<TitleRecord> = Vec::new();
    let mut ids: Vec<MediaIdEntry> = Vec::new();
    let stats = loader.run(&mut titles, &mut ids)?;

    let order: Vec<String> = titles.iter().map(TitleRecord::title).collect();
    assert_eq!(order, vec![SHOW, FINALE, PILOT, ALPHA, ZETA]);
    assert_eq!(stats.records, 5);
    assert_eq!(stats.inherited, 2);

    let alpha = find(&titles, ALPHA);
    assert_eq!(alpha.kind, MediaKind::Movie);
    assert_eq!(alpha.year.as_deref(), Some("2001"));
    assert_eq!(alpha.genres.iter().collect::<Vec<_>>(), vec!["Comedy", "Drama"]);
    assert_eq!(alpha.also_known_as.len(), 2);
    assert_eq!(alpha.also_known_as[0].title, "Alfa (2001)");
    assert_eq!(alpha.also_known_as[0].notes, vec!["Italy"]);
    assert_eq!(alpha.also_known_as[1].notes, vec!["USA", "working title"]);
    let rating = alpha.rating.as_ref().unwrap();
    assert_eq!(rating.votes, 56);
    assert_eq!(rating.rank, 6.1);
    assert_eq!(alpha.plots.len(), 1);
    assert_eq!(alpha.plots[0].by.as_deref(), Some("Another"));
    assert_eq!(alpha.media_id.as_deref(), Some("id-alpha"));
    assert!(!alpha.new_media_id);

    let zeta = find(&titles, ZETA);
    assert_eq!(zeta.plots[0].text, "Something lurks. It waits.");
    assert_eq!(zeta.rating.as_ref().unwrap().votes, 1234);
    assert_eq!(zeta.years.as_deref(), Some("1999"));

    let show = find(&titles, SHOW);
    assert_eq!(show.kind, MediaKind::TvSeries);
    assert!(show.new_media_id);
    assert!(show.parent_media_id.is_none());

    for episode in [PILOT, FINALE] {
        let episode = find(&titles, episode);
        assert_eq!(episode.kind, MediaKind::TvSeries);
        assert_eq!(episode.partial_key, SHOW);
        assert_eq!(episode.parent_media_id, show.media_id);
        assert_ne!(episode.media_id, show.media_id);
        assert!(episode.genres.contains("Sci-Fi"));
        assert_eq!(episode.parent_also_known_as[0].title, "Le Show (2000)");
        assert!(episode.also_known_as.is_empty());
    }
    assert_eq!(find(&titles, PILOT).episode.as_deref(), Some("Pilot (#1.1)"));

    // The series and both episodes got new ids
    assert_eq!(stats.ids_created, 3);
    let created: Vec<&str> = ids.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(created, vec![SHOW, FINALE, PILOT]);
    assert_eq!(ids[0].global_id, show.media_id.clone().unwrap());

    for dataset in Dataset::ALL {
        assert!(loader.sorted(dataset).exists(), "{} not sorted", dataset.name());
        assert_eq!(loader.progress().get(dataset.name()).unwrap().phase, Phase::Done);
    }
    Ok(())
}

/// Test that without a media-id list every title gets a new id
#[test]
fn test_import_without_media_ids() -> anyhow::Result<()> {
    let source = TempDir::new()?;
    let work = TempDir::new()?;
    write_dumps(source.path(), false)?;

    let loader = Loader::new(source.path(), work.path(), Options::default())?;
    let mut titles: Vec<TitleRecord> = Vec::new();
    let mut ids: Vec<MediaIdEntry> = Vec::new();
    let stats = loader.run(&mut titles, &mut ids)?;

    assert_eq!(stats.records, 5);
    assert_eq!(stats.ids_created, 5);
    assert!(titles.iter().all(|t| t.new_media_id));
    assert!(!loader.sorted(Dataset::MediaIds).exists());
    Ok(())
}

/// Test that a missing required dump fails the run before anything is
/// committed
#[test]
fn test_missing_required_dump() -> anyhow::Result<()> {
    let source = TempDir::new()?;
    let work = TempDir::new()?;
    write_dumps(source.path(), true)?;
    fs::remove_file(source.path().join("genres.list"))?;

    let loader = Loader::new(source.path(), work.path(), Options::default())?;
    let mut titles: Vec<TitleRecord> = Vec::new();
    let mut ids: Vec<MediaIdEntry> = Vec::new();
    let err = loader.run(&mut titles, &mut ids).unwrap_err();

    assert!(matches!(err, Error::Io(_)));
    assert!(titles.is_empty());
    assert_eq!(loader.progress().get("genres").unwrap().phase, Phase::Failed);
    // The other pipelines still ran to completion
    assert_eq!(loader.progress().get("movies").unwrap().phase, Phase::Done);
    Ok(())
}

/// Test that each sort pipeline reports its own outcome
#[test]
fn test_sort_all_reports_each_dataset() -> anyhow::Result<()> {
    let source = TempDir::new()?;
    let work = TempDir::new()?;
    write_dumps(source.path(), false)?;
    // A ratings dump without its footer
    fs::write(source.path().join("ratings.list"), "MOVIE RATINGS REPORT\n\nNew  Distribution  Votes  Rank  Title\n")?;

    let loader = Loader::new(source.path(), work.path(), Options::default())?;
    let results = loader.sort_all();

    assert_eq!(results.len(), 5);
    for (dataset, result) in results {
        match dataset {
            Dataset::Ratings => assert!(matches!(result, Err(Error::BoundaryNotFound { .. }))),
            _ => assert!(result.is_ok(), "{} failed", dataset.name()),
        }
    }
    Ok(())
}

/// Test that composite records serialize as JSON lines
#[test]
fn test_json_lines_output() -> anyhow::Result<()> {
    let source = TempDir::new()?;
    let work = TempDir::new()?;
    write_dumps(source.path(), true)?;

    let loader = Loader::new(source.path(), work.path(), Options::default())?;
    let mut titles = JsonLinesSink::new(Vec::new());
    let mut ids = JsonLinesSink::new(Vec::new());
    loader.run(&mut titles, &mut ids)?;

    assert_eq!(titles.written(), 5);
    assert_eq!(ids.written(), 3);

    let output = String::from_utf8(titles.into_inner())?;
    let first: serde_json::Value = serde_json::from_str(output.lines().next().unwrap())?;
    assert_eq!(first["key"], SHOW);
    assert_eq!(first["kind"], "tv_series");
    assert_eq!(first["genres"][0], "Sci-Fi");
    Ok(())
}
