//! Saved forum thread pages to tabular post records.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::table::Table;

/// Posts numbered above this are the board's own end-of-thread notices
pub const MAX_POST_NUMBER: u32 = 1000;

/// Japan Standard Time, the board's clock
const JST_OFFSET_SECS: i32 = 9 * 3600;

static POST: Lazy<Selector> = Lazy::new(|| Selector::parse(".post").expect("valid selector"));
static NUMBER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".meta .number").expect("valid selector"));
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse(".meta .date").expect("valid selector"));
static NAME: Lazy<Selector> = Lazy::new(|| Selector::parse(".meta .name").expect("valid selector"));
static UID: Lazy<Selector> = Lazy::new(|| Selector::parse(".meta .uid").expect("valid selector"));
static MESSAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".message .escaped").expect("valid selector"));

/// One post of a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub post_id: u32,
    pub date: DateTime<FixedOffset>,
    pub user: String,
    pub user_id: String,
    pub contents: String,
}

fn text_of(post: &ElementRef, selector: &Selector) -> Option<String> {
    post.select(selector)
        .next()
        .map(|el| el.text().collect::<String>())
}

/// Parses `2021/03/04(木) 12:34:56.78` as Japan Standard Time
pub fn parse_post_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let (day, rest) = raw.trim().split_once('(')?;
    let (_, time) = rest.split_once(") ")?;
    let naive = NaiveDateTime::parse_from_str(
        &format!("{} {}", day.trim(), time.trim()),
        "%Y/%m/%d %H:%M:%S%.f",
    )
    .ok()?;
    FixedOffset::east_opt(JST_OFFSET_SECS)?
        .from_local_datetime(&naive)
        .single()
}

/// Every post numbered up to [`MAX_POST_NUMBER`], in page order
pub fn parse_thread(html: &str) -> Vec<Post> {
    let document = Html::parse_document(html);
    let mut posts = Vec::new();
    for post in document.select(&POST) {
        let Some(number) = text_of(&post, &NUMBER) else {
            continue;
        };
        let Ok(post_id) = number.trim().parse::<u32>() else {
            debug!("Skipping post with number {:?}", number);
            continue;
        };
        if post_id > MAX_POST_NUMBER {
            continue;
        }
        let raw_date = text_of(&post, &DATE).unwrap_or_default();
        let Some(date) = parse_post_date(&raw_date) else {
            warn!("Skipping post {} with unreadable date {:?}", post_id, raw_date);
            continue;
        };
        posts.push(Post {
            post_id,
            date,
            user: text_of(&post, &NAME).unwrap_or_default(),
            user_id: text_of(&post, &UID).unwrap_or_default(),
            contents: text_of(&post, &MESSAGE).unwrap_or_default(),
        });
    }
    posts
}

/// Unix timestamp of the thread's first post, falling back to its earliest
pub fn thread_id(posts: &[Post]) -> Option<i64> {
    posts
        .iter()
        .find(|p| p.post_id == 1)
        .or_else(|| posts.iter().min_by_key(|p| p.date))
        .map(|p| p.date.timestamp())
}

/// Files matching `pattern`, where `*` and `?` in the file name are wildcards
pub fn matching_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let expr = regex::escape(&name).replace(r"\*", ".*").replace(r"\?", ".");
    let matcher = Regex::new(&format!("^{}$", expr))
        .with_context(|| format!("Invalid file pattern {}", pattern))?;

    let mut files = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_file() && matcher.is_match(&file_name) {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(PipelineError::NoInputFiles(pattern.to_string()).into());
    }
    Ok(files)
}

/// Output of [`merge_threads`]
#[derive(Debug)]
pub struct MergedThreads {
    pub posts: Table,
    pub meta: Table,
    pub unique_users: Table,
}

fn format_date(date: &DateTime<FixedOffset>) -> String {
    date.format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string()
}

/// Parses every page and builds the merged posts, meta and unique-user tables
pub fn merge_threads(files: &[PathBuf]) -> Result<MergedThreads> {
    let mut all: Vec<(i64, Post)> = Vec::new();
    let mut meta = Table::new(["filepath", "thread_id"]);

    for file in files {
        println!("Merging file: {}", file.display());
        let html = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {} as UTF-8", file.display()))?;
        let posts = parse_thread(&html);
        let Some(thread) = thread_id(&posts) else {
            warn!("No posts found in {}", file.display());
            continue;
        };
        if !posts.iter().any(|p| p.post_id == 1) {
            warn!("{} has no first post, using its earliest post for the thread id", file.display());
        }
        debug!("{} posts in thread {} ({})", posts.len(), thread, file.display());
        meta.push_row(vec![file.display().to_string(), thread.to_string()]);
        all.extend(posts.into_iter().map(|p| (thread, p)));
    }

    all.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.date.cmp(&b.1.date)));

    let mut posts = Table::new(["post_id", "date", "user", "user_id", "contents", "thread_id"]);
    let mut users: BTreeMap<i64, HashSet<&str>> = BTreeMap::new();
    for (thread, post) in &all {
        posts.push_row(vec![
            post.post_id.to_string(),
            format_date(&post.date),
            post.user.clone(),
            post.user_id.clone(),
            post.contents.clone(),
            thread.to_string(),
        ]);
        users
            .entry(*thread)
            .or_default()
            .insert(post.user_id.as_str());
    }

    let mut unique_users = Table::new(["thread_id", "unique_users"]);
    for (thread, ids) in users {
        unique_users.push_row(vec![thread.to_string(), ids.len().to_string()]);
    }

    Ok(MergedThreads {
        posts,
        meta,
        unique_users,
    })
}

/// Writes `merged_data.csv`, `merged_data_meta.csv` and `unique_users.csv`
/// into `save_folder`
pub fn run_forum(pattern: &str, save_folder: &Path, delimiter: u8) -> Result<MergedThreads> {
    std::fs::create_dir_all(save_folder)
        .with_context(|| format!("Failed to create {}", save_folder.display()))?;
    let files = matching_files(pattern)?;
    info!("Found {} thread pages for {}", files.len(), pattern);

    let merged = merge_threads(&files)?;
    let posts_path = save_folder.join("merged_data.csv");
    println!("Saving to {}...", posts_path.display());
    merged.posts.write(&posts_path, delimiter)?;
    merged
        .meta
        .write(&save_folder.join("merged_data_meta.csv"), delimiter)?;
    merged
        .unique_users
        .write(&save_folder.join("unique_users.csv"), delimiter)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn post(number: u32, date: &str, name: &str, uid: &str, body: &str) -> String {
        format!(
            r#"<div class="post"><div class="meta"><span class="number">{number}</span><span class="name"><b>{name}</b></span><span class="date">{date}</span><span class="uid">{uid}</span></div><div class="message"><span class="escaped">{body}</span></div></div>"#
        )
    }

    fn page(posts: &[String]) -> String {
        format!("<html><body><div class=\"thread\">{}</div></body></html>", posts.concat())
    }

    #[test]
    fn test_parse_post_date() {
        let date = parse_post_date("2021/03/04(木) 12:34:56.78").unwrap();
        assert_eq!(date.to_rfc3339(), "2021-03-04T12:34:56.780+09:00");
        assert!(parse_post_date("yesterday").is_none());
    }

    #[test]
    fn test_parse_thread_skips_notices() {
        let html = page(&[
            post(1, "2021/03/04(木) 12:00:00.00", "Anon", "ID:aaa", "first"),
            post(2, "2021/03/04(木) 12:05:00.00", "Anon", "ID:bbb", "second <b>bold</b>"),
            post(1001, "2021/03/05(金) 00:00:00.00", "Board", "ID:sys", "over 1000"),
        ]);
        let posts = parse_thread(&html);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].contents, "second bold");
        assert_eq!(posts[0].user, "Anon");
        assert_eq!(posts[0].user_id, "ID:aaa");
        assert_eq!(thread_id(&posts), Some(1614826800));
    }

    #[test]
    fn test_run_forum_writes_tables() {
        let dir = tempdir().unwrap();
        let second = page(&[
            post(1, "2021/03/06(土) 09:00:00.00", "Anon", "ID:x", "b1"),
            post(2, "2021/03/06(土) 09:01:00.00", "Anon", "ID:x", "b2"),
        ]);
        let first = page(&[
            post(2, "2021/03/04(木) 12:05:00.00", "Anon", "ID:bbb", "a2"),
            post(1, "2021/03/04(木) 12:00:00.00", "Anon", "ID:aaa", "a1"),
        ]);
        std::fs::write(dir.path().join("thread_b.html"), second).unwrap();
        std::fs::write(dir.path().join("thread_a.html"), first).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let pattern = dir.path().join("thread_*.html");
        let out = dir.path().join("out");
        let merged = run_forum(&pattern.to_string_lossy(), &out, b',').unwrap();

        let contents: Vec<&str> = merged.posts.rows().iter().map(|r| r[4].as_str()).collect();
        assert_eq!(contents, vec!["a1", "a2", "b1", "b2"]);
        assert_eq!(merged.meta.len(), 2);
        assert_eq!(
            merged.unique_users.rows(),
            [
                vec!["1614826800".to_string(), "2".to_string()],
                vec!["1614988800".to_string(), "1".to_string()],
            ]
        );
        assert!(out.join("merged_data.csv").exists());
        assert!(out.join("merged_data_meta.csv").exists());
        assert!(out.join("unique_users.csv").exists());
    }

    #[test]
    fn test_no_matching_files() {
        let dir = tempdir().unwrap();
        let pattern = dir.path().join("missing_*.html");
        let err = matching_files(&pattern.to_string_lossy()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoInputFiles(_))
        ));
    }
}
