use anyhow::Result;
use link_pipeline::config::PipelineConfig;
use link_pipeline::error::PipelineError;
use link_pipeline::pipeline::{run_canonicalize, run_extract, run_report, run_resolve};
use link_pipeline::table::Table;
use link_pipeline::url_canonicalizer::Canonicalizer;
use link_pipeline::url_resolver::{RedirectResolver, ResolverConfig};
use std::path::Path;
use tempfile::tempdir;

fn write_corpus(path: &Path, host: &str) -> Result<()> {
    let mut corpus = Table::new([
        "tweet_id",
        "text",
        "created_at",
        "user_screen_name",
        "tweet_retweet_count",
    ]);
    for (id, text, ts, user, weight) in [
        ("1", format!("see http://{host}/a now"), "2021-03-04 10:00:00+00:00", "alice", "5"),
        (
            "2",
            format!("again http://{host}/a and http://{host}/b"),
            "2021-02-01 09:00:00+00:00",
            "bob",
            "1",
        ),
        ("3", "no links here".to_string(), "2021-03-05 08:00:00+00:00", "carol", "0"),
    ] {
        corpus.push_row(vec![
            id.into(),
            text,
            ts.into(),
            user.into(),
            weight.into(),
        ]);
    }
    corpus.write(path, b',')
}

fn column<'a>(table: &'a Table, name: &str) -> Vec<&'a str> {
    let col = table.column_index(name).unwrap();
    table.rows().iter().map(|r| r[col].as_str()).collect()
}

#[tokio::test]
async fn test_full_pipeline() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let host = server.host_with_port();
    let redirect = server
        .mock("HEAD", "/a")
        .with_status(301)
        .with_header("location", "https://www.example.com/article?utm_source=x&id=5")
        .expect(2)
        .create_async()
        .await;
    let plain = server
        .mock("HEAD", "/b")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let dir = tempdir()?;
    let corpus_path = dir.path().join("corpus.csv");
    write_corpus(&corpus_path, &host)?;
    let config = PipelineConfig::default();

    // extract
    let extracted = run_extract(&corpus_path, &config)?;
    assert_eq!(extracted.link_count, 3);
    assert_eq!(extracted.unique_urls, 2);
    let dictionary = Table::read(&extracted.dictionary_path, b',')?;
    assert_eq!(dictionary.len(), 3);
    assert!(column(&dictionary, "error_expanding").iter().all(|f| *f == "True"));

    // resolve
    let resolver = RedirectResolver::new(ResolverConfig::from(&config.resolver))?;
    let summary = run_resolve(&extracted.dictionary_path, &config, &resolver).await?;
    assert_eq!(summary.errors_before, 3);
    assert_eq!(summary.errors_after, 1);
    assert!(summary.checkpoint_path.exists());
    assert!(summary.grouped_path.exists());
    redirect.assert_async().await;
    plain.assert_async().await;

    let resolved = Table::read(&extracted.dictionary_path, b',')?;
    let a = format!("http://{host}/a");
    let url_col = column(&resolved, "url");
    let expanded = column(&resolved, "expanded_url");
    let flags = column(&resolved, "error_expanding");
    for i in 0..resolved.len() {
        if url_col[i] == a {
            assert_eq!(expanded[i], "https://www.example.com/article?utm_source=x&id=5");
            assert_eq!(flags[i], "False");
        } else {
            assert_eq!(expanded[i], "");
            assert_eq!(flags[i], "True");
        }
    }

    // a second run leaves resolved rows alone
    let resolved_lines = |text: &str| -> Vec<String> {
        text.lines()
            .filter(|line| line.contains(&a))
            .map(str::to_string)
            .collect()
    };
    let before = resolved_lines(&std::fs::read_to_string(&extracted.dictionary_path)?);
    assert_eq!(before.len(), 2);
    let again = run_resolve(&extracted.dictionary_path, &config, &resolver).await?;
    assert_eq!(again.errors_before, 1);
    assert_eq!(again.errors_after, 1);
    let after = resolved_lines(&std::fs::read_to_string(&extracted.dictionary_path)?);
    assert_eq!(before, after);
    redirect.assert_async().await;

    // canonicalize
    let canonicalizer = Canonicalizer::new(&config.canonicalizer)?;
    let processed_path = run_canonicalize(&extracted.dictionary_path, &config, &canonicalizer)?;
    let processed = Table::read(&processed_path, b',')?;
    let urls = column(&processed, "url");
    let clean = column(&processed, "clean_expanded_url");
    let roots = column(&processed, "root_domain");
    for i in 0..processed.len() {
        if urls[i] == a {
            assert_eq!(clean[i], "https://www.example.com/article/?id=5");
            assert_eq!(roots[i], "example.com");
        } else {
            assert_eq!(clean[i], "");
        }
    }

    // report
    let outputs = run_report(&extracted.links_path, &processed_path, &corpus_path, &config)?;
    let archive = Table::read(&outputs.archive_path, b',')?;
    let archived: Vec<&str> = column(&archive, "archive_url");
    assert!(archived.contains(&"https://web.archive.org/web/20210201/https://www.example.com/article/?id=5"));

    let by_domain = Table::read(&outputs.by_domain_path, b',')?;
    let row = by_domain
        .rows()
        .iter()
        .find(|r| r[0] == "example.com")
        .expect("example.com counted");
    assert_eq!(row[1], "2");
    assert_eq!(row[2], "2");
    assert_eq!(row[3], "1");
    assert!(outputs.by_month_path.exists());
    assert!(outputs.by_user_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_resolve_checkpoint_holds_every_chunk() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let host = server.host_with_port();
    let redirects = server
        .mock("HEAD", mockito::Matcher::Regex(r"^/r\d$".to_string()))
        .with_status(302)
        .with_header("location", "https://example.com/landing")
        .expect(5)
        .create_async()
        .await;

    let dir = tempdir()?;
    let dictionary_path = dir.path().join("dict.csv");
    let mut dictionary = Table::new(["url", "hits"]);
    for i in 0..5 {
        dictionary.push_row(vec![format!("http://{host}/r{i}"), "1".into()]);
    }
    dictionary.write(&dictionary_path, b',')?;

    let mut config = PipelineConfig::default();
    config.resolver.chunk_size = 2;
    let resolver = RedirectResolver::new(ResolverConfig::from(&config.resolver))?;

    // left over from an interrupted run
    std::fs::write(
        dictionary_path.with_extension("csv.tmp"),
        "\"url\",\"stale\"\n\"http://old/x\",\"1\"\n",
    )?;

    let check = |path: &Path| -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6, "one header and five rows: {text}");
        assert_eq!(lines.iter().filter(|l| l.contains("\"hits\"")).count(), 1);
        assert!(!text.contains("http://old/x"));
        let checkpoint = Table::read(path, b',')?;
        let urls = column(&checkpoint, "url");
        let expected: Vec<String> = (0..5).map(|i| format!("http://{host}/r{i}")).collect();
        assert_eq!(urls, expected.iter().map(String::as_str).collect::<Vec<_>>());
        Ok(())
    };

    let summary = run_resolve(&dictionary_path, &config, &resolver).await?;
    assert_eq!(summary.errors_before, 5);
    assert_eq!(summary.errors_after, 0);
    assert_eq!(summary.checkpoint_path, dictionary_path.with_extension("csv.tmp"));
    check(&summary.checkpoint_path)?;

    // a new run starts the checkpoint over instead of appending to it
    let again = run_resolve(&dictionary_path, &config, &resolver).await?;
    assert_eq!(again.errors_before, 0);
    check(&again.checkpoint_path)?;
    let resolved = Table::read(&dictionary_path, b',')?;
    assert!(column(&resolved, "expanded_url")
        .iter()
        .all(|u| *u == "https://example.com/landing"));
    redirects.assert_async().await;
    Ok(())
}

#[test]
fn test_missing_columns_fail_before_writing() -> Result<()> {
    let dir = tempdir()?;
    let corpus_path = dir.path().join("corpus.csv");
    let mut corpus = Table::new(["tweet_id", "text"]);
    corpus.push_row(vec!["1".into(), "http://example.com/x".into()]);
    corpus.write(&corpus_path, b',')?;

    let err = run_extract(&corpus_path, &PipelineConfig::default()).unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::MissingColumns { missing, .. }) => {
            assert!(missing.contains(&"created_at".to_string()));
        }
        other => panic!("expected MissingColumns, got {other:?}"),
    }
    assert!(!dir.path().join("corpus_links.csv").exists());
    Ok(())
}

#[test]
fn test_semicolon_delimiter() -> Result<()> {
    let dir = tempdir()?;
    let corpus_path = dir.path().join("corpus.csv");
    let mut corpus = Table::new([
        "tweet_id",
        "text",
        "created_at",
        "user_screen_name",
        "tweet_retweet_count",
    ]);
    corpus.push_row(vec![
        "1".into(),
        "read https://example.org/x; later".into(),
        "2021-03-04".into(),
        "alice".into(),
        "2".into(),
    ]);
    corpus.write(&corpus_path, b';')?;

    let mut config = PipelineConfig::default();
    config.csv.delimiter = ";".to_string();
    let extracted = run_extract(&corpus_path, &config)?;
    let links = Table::read(&extracted.links_path, b';')?;
    assert_eq!(column(&links, "url"), vec!["https://example.org/x"]);
    Ok(())
}
