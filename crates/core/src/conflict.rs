//! Name-collision handling for uploads, renames and duplicates
//!
//! A [`ConflictResolver`] owns the set of names already claimed at a
//! destination. Each candidate that collides is settled by a
//! [`ConflictPrompt`], either interactively or by a fixed policy, and a
//! decision marked "apply to all" is reused for the rest of the batch.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;

/// Suffix inserted before the extension of a duplicated object
pub const DUPLICATE_TAG: &str = "_copy";

/// What to do with a name that is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    /// Proceed with the original name, replacing the existing object
    Overwrite,
    /// Leave the item out of the operation
    Skip,
    /// Pick the next free `base_N.ext` name
    Rename,
}

impl FromStr for ConflictAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" | "o" => Ok(Self::Overwrite),
            "skip" | "s" => Ok(Self::Skip),
            "rename" | "r" => Ok(Self::Rename),
            other => Err(Error::InvalidPath(format!(
                "unknown conflict action '{other}' (expected overwrite, skip or rename)"
            ))),
        }
    }
}

impl std::fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
            Self::Rename => "rename",
        };
        f.write_str(s)
    }
}

/// A decision for one collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDecision {
    pub action: ConflictAction,
    /// Reuse this decision for every later collision in the same batch
    pub sticky_for_batch: bool,
}

impl ConflictDecision {
    pub const fn once(action: ConflictAction) -> Self {
        Self {
            action,
            sticky_for_batch: false,
        }
    }

    pub const fn for_all(action: ConflictAction) -> Self {
        Self {
            action,
            sticky_for_batch: true,
        }
    }
}

/// Port through which the engine asks for a collision decision
#[async_trait]
pub trait ConflictPrompt: Send + Sync {
    /// `name` is the colliding top-level name; `is_batch` tells the
    /// implementation whether "apply to all" is meaningful.
    async fn resolve_conflict(&self, name: &str, is_batch: bool) -> ConflictDecision;
}

/// Non-interactive prompt answering every collision the same way
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub ConflictAction);

#[async_trait]
impl ConflictPrompt for FixedPolicy {
    async fn resolve_conflict(&self, _name: &str, _is_batch: bool) -> ConflictDecision {
        ConflictDecision::for_all(self.0)
    }
}

/// A pending question sent to whoever answers for a [`ChannelPrompt`]
#[derive(Debug)]
pub struct ConflictQuery {
    pub name: String,
    pub is_batch: bool,
    pub reply: oneshot::Sender<ConflictDecision>,
}

/// Prompt that forwards each question over a channel and waits for the reply
///
/// Used by interactive callers: the engine suspends until the UI side
/// answers. A dropped query or a closed channel counts as `skip`.
#[derive(Debug, Clone)]
pub struct ChannelPrompt {
    tx: mpsc::Sender<ConflictQuery>,
}

impl ChannelPrompt {
    /// Create the prompt and the receiving end the UI should drain
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ConflictQuery>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConflictPrompt for ChannelPrompt {
    async fn resolve_conflict(&self, name: &str, is_batch: bool) -> ConflictDecision {
        let (reply, answer) = oneshot::channel();
        let query = ConflictQuery {
            name: name.to_string(),
            is_batch,
            reply,
        };
        if self.tx.send(query).await.is_err() {
            tracing::warn!(name, "conflict prompt closed, skipping");
            return ConflictDecision::once(ConflictAction::Skip);
        }
        answer
            .await
            .unwrap_or(ConflictDecision::once(ConflictAction::Skip))
    }
}

/// Outcome of resolving one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Name to persist, `None` when skipped
    pub name: Option<String>,
    /// Decision applied, `None` when there was no collision
    pub decision: Option<ConflictDecision>,
}

impl Resolution {
    pub fn is_skip(&self) -> bool {
        self.name.is_none()
    }
}

/// Tracks claimed names at one destination across a batch
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    claimed: HashSet<String>,
    sticky: Option<ConflictDecision>,
    is_batch: bool,
    // Uploaded folder -> name it was resolved to (None when skipped)
    folders: HashMap<String, Option<String>>,
}

impl ConflictResolver {
    /// Start from the names already present at the destination
    pub fn new<I, S>(existing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            claimed: existing.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Mark the resolver as serving a multi-item batch
    pub fn batch(mut self, is_batch: bool) -> Self {
        self.is_batch = is_batch;
        self
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.claimed.contains(name)
    }

    pub fn claimed(&self) -> &HashSet<String> {
        &self.claimed
    }

    /// The "apply to all" decision in force, if any
    pub fn sticky(&self) -> Option<ConflictDecision> {
        self.sticky
    }

    /// Resolve `candidate`, a name or relative upload path like `dir/sub/file.txt`
    ///
    /// Only the top-level segment takes part in collision checks. Whatever
    /// name comes out is claimed immediately so later items see it as taken.
    /// Files below the same uploaded folder all follow the decision made
    /// for the first of them.
    pub async fn resolve(&mut self, candidate: &str, prompt: &dyn ConflictPrompt) -> Resolution {
        let (top, rest) = split_upload_path(candidate);

        if let Some(rest) = rest
            && let Some(mapped) = self.folders.get(top)
        {
            return Resolution {
                name: mapped.as_ref().map(|folder| format!("{folder}/{rest}")),
                decision: None,
            };
        }

        let (resolved, decision) = if self.claimed.insert(top.to_string()) {
            (Some(top.to_string()), None)
        } else {
            let decision = match self.sticky {
                Some(decision) => decision,
                None => {
                    let decision = prompt.resolve_conflict(top, self.is_batch).await;
                    if decision.sticky_for_batch {
                        self.sticky = Some(decision);
                    }
                    decision
                }
            };
            tracing::debug!(name = top, action = %decision.action, "name collision");

            let resolved = match decision.action {
                ConflictAction::Skip => None,
                ConflictAction::Overwrite => Some(top.to_string()),
                ConflictAction::Rename => {
                    let fresh = next_free_name(top, &self.claimed);
                    self.claimed.insert(fresh.clone());
                    Some(fresh)
                }
            };
            (resolved, Some(decision))
        };

        if rest.is_some() {
            self.folders.insert(top.to_string(), resolved.clone());
        }
        Resolution {
            name: resolved.map(|name| match rest {
                Some(rest) => format!("{name}/{rest}"),
                None => name,
            }),
            decision,
        }
    }
}

/// Split a relative upload path into its first segment and the remainder
pub fn split_upload_path(candidate: &str) -> (&str, Option<&str>) {
    match candidate.split_once('/') {
        Some((top, rest)) if !rest.is_empty() => (top, Some(rest)),
        Some((top, _)) => (top, None),
        None => (candidate, None),
    }
}

/// Split `name` into base and extension (`.ext`, empty if none)
///
/// A leading dot does not start an extension, so `.env` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

/// First `base_N.ext` (N from 1) that is not in `claimed`
pub fn next_free_name(name: &str, claimed: &HashSet<String>) -> String {
    let (base, ext) = split_extension(name);
    numbered(base, ext, claimed)
}

/// Name for a duplicate of `name` that collides with nothing in `claimed`
///
/// `report.txt` becomes `report_copy.txt`, then `report_copy_1.txt`, and so on.
/// Folder names never split an extension.
pub fn duplicate_name(name: &str, is_folder: bool, claimed: &HashSet<String>) -> String {
    let (base, ext) = if is_folder {
        (name, "")
    } else {
        split_extension(name)
    };
    let tagged = format!("{base}{DUPLICATE_TAG}");
    let candidate = format!("{tagged}{ext}");
    if claimed.contains(&candidate) {
        numbered(&tagged, ext, claimed)
    } else {
        candidate
    }
}

fn numbered(base: &str, ext: &str, claimed: &HashSet<String>) -> String {
    (1u64..)
        .map(|counter| format!("{base}_{counter}{ext}"))
        .find(|name| !claimed.contains(name))
        .unwrap_or_else(|| format!("{base}_{}{ext}", u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Prompt that replays scripted answers and records what it was asked
    struct Scripted {
        answers: Mutex<Vec<ConflictDecision>>,
        asked: Mutex<Vec<(String, bool)>>,
    }

    impl Scripted {
        fn new(answers: Vec<ConflictDecision>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().rev().collect()),
                asked: Mutex::new(Vec::new()),
            }
        }

        fn asked(&self) -> Vec<(String, bool)> {
            self.asked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConflictPrompt for Scripted {
        async fn resolve_conflict(&self, name: &str, is_batch: bool) -> ConflictDecision {
            self.asked.lock().unwrap().push((name.to_string(), is_batch));
            self.answers
                .lock()
                .unwrap()
                .pop()
                .expect("prompt asked more often than scripted")
        }
    }

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a.txt"), ("a", ".txt"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
    }

    #[test]
    fn test_split_upload_path() {
        assert_eq!(split_upload_path("a.txt"), ("a.txt", None));
        assert_eq!(split_upload_path("dir/sub/a.txt"), ("dir", Some("sub/a.txt")));
        assert_eq!(split_upload_path("dir/"), ("dir", None));
    }

    #[test]
    fn test_next_free_name_counts_up() {
        assert_eq!(next_free_name("a.txt", &set(&["a.txt"])), "a_1.txt");
        assert_eq!(
            next_free_name("a.txt", &set(&["a.txt", "a_1.txt"])),
            "a_2.txt"
        );
        assert_eq!(next_free_name("photos", &set(&["photos"])), "photos_1");
    }

    #[test]
    fn test_duplicate_name() {
        assert_eq!(duplicate_name("a.txt", false, &set(&["a.txt"])), "a_copy.txt");
        assert_eq!(
            duplicate_name("a.txt", false, &set(&["a.txt", "a_copy.txt"])),
            "a_copy_1.txt"
        );
        assert_eq!(duplicate_name("v1.2", true, &set(&["v1.2"])), "v1.2_copy");
    }

    #[test]
    fn test_conflict_action_from_str() {
        assert_eq!("rename".parse::<ConflictAction>().unwrap(), ConflictAction::Rename);
        assert_eq!("O".parse::<ConflictAction>().unwrap(), ConflictAction::Overwrite);
        assert!("maybe".parse::<ConflictAction>().is_err());
    }

    #[tokio::test]
    async fn test_no_collision_claims_name_without_prompting() {
        let prompt = Scripted::new(vec![]);
        let mut resolver = ConflictResolver::new(["other.txt"]);

        let res = resolver.resolve("a.txt", &prompt).await;
        assert_eq!(res.name.as_deref(), Some("a.txt"));
        assert!(res.decision.is_none());
        assert!(resolver.is_claimed("a.txt"));
        assert!(prompt.asked().is_empty());
    }

    #[tokio::test]
    async fn test_rename_twice_yields_increasing_suffixes() {
        let prompt = FixedPolicy(ConflictAction::Rename);
        let mut resolver = ConflictResolver::new(["a.txt"]);

        let first = resolver.resolve("a.txt", &prompt).await;
        assert_eq!(first.name.as_deref(), Some("a_1.txt"));

        let second = resolver.resolve("a.txt", &prompt).await;
        assert_eq!(second.name.as_deref(), Some("a_2.txt"));
    }

    #[tokio::test]
    async fn test_skip_returns_no_name() {
        let prompt = Scripted::new(vec![ConflictDecision::once(ConflictAction::Skip)]);
        let mut resolver = ConflictResolver::new(["a.txt"]);

        let res = resolver.resolve("a.txt", &prompt).await;
        assert!(res.is_skip());
        assert_eq!(
            res.decision,
            Some(ConflictDecision::once(ConflictAction::Skip))
        );
    }

    #[tokio::test]
    async fn test_overwrite_keeps_name() {
        let prompt = Scripted::new(vec![ConflictDecision::once(ConflictAction::Overwrite)]);
        let mut resolver = ConflictResolver::new(["a.txt"]);

        let res = resolver.resolve("a.txt", &prompt).await;
        assert_eq!(res.name.as_deref(), Some("a.txt"));
    }

    #[tokio::test]
    async fn test_sticky_decision_is_not_asked_again() {
        let prompt = Scripted::new(vec![ConflictDecision::for_all(ConflictAction::Rename)]);
        let mut resolver = ConflictResolver::new(["report.txt"]).batch(true);

        let first = resolver.resolve("report.txt", &prompt).await;
        let second = resolver.resolve("report.txt", &prompt).await;

        assert_eq!(first.name.as_deref(), Some("report_1.txt"));
        assert_eq!(second.name.as_deref(), Some("report_2.txt"));
        assert_eq!(prompt.asked(), vec![("report.txt".to_string(), true)]);
        assert_eq!(
            resolver.sticky(),
            Some(ConflictDecision::for_all(ConflictAction::Rename))
        );
    }

    #[tokio::test]
    async fn test_non_sticky_decision_asks_each_time() {
        let prompt = Scripted::new(vec![
            ConflictDecision::once(ConflictAction::Overwrite),
            ConflictDecision::once(ConflictAction::Skip),
        ]);
        let mut resolver = ConflictResolver::new(["a.txt", "b.txt"]).batch(true);

        assert_eq!(
            resolver.resolve("a.txt", &prompt).await.name.as_deref(),
            Some("a.txt")
        );
        assert!(resolver.resolve("b.txt", &prompt).await.is_skip());
        assert_eq!(prompt.asked().len(), 2);
    }

    #[tokio::test]
    async fn test_rename_keeps_remainder_of_upload_path() {
        let prompt = FixedPolicy(ConflictAction::Rename);
        let mut resolver = ConflictResolver::new(["photos"]);

        let res = resolver.resolve("photos/2024/beach.jpg", &prompt).await;
        assert_eq!(res.name.as_deref(), Some("photos_1/2024/beach.jpg"));
        assert!(resolver.is_claimed("photos_1"));
    }

    #[tokio::test]
    async fn test_uploaded_folder_resolved_once() {
        let prompt = Scripted::new(vec![ConflictDecision::once(ConflictAction::Rename)]);
        let mut resolver = ConflictResolver::new(["site"]).batch(true);

        let names = [
            resolver.resolve("site/index.html", &prompt).await.name,
            resolver.resolve("site/css/main.css", &prompt).await.name,
            resolver.resolve("fresh/a.txt", &prompt).await.name,
            resolver.resolve("fresh/b.txt", &prompt).await.name,
        ];
        assert_eq!(
            names,
            [
                Some("site_1/index.html".to_string()),
                Some("site_1/css/main.css".to_string()),
                Some("fresh/a.txt".to_string()),
                Some("fresh/b.txt".to_string()),
            ]
        );
        assert_eq!(prompt.asked().len(), 1);
    }

    #[tokio::test]
    async fn test_skipped_folder_skips_its_files() {
        let prompt = Scripted::new(vec![ConflictDecision::once(ConflictAction::Skip)]);
        let mut resolver = ConflictResolver::new(["site"]);

        assert!(resolver.resolve("site/a", &prompt).await.is_skip());
        assert!(resolver.resolve("site/b", &prompt).await.is_skip());
        assert_eq!(prompt.asked().len(), 1);
    }

    #[tokio::test]
    async fn test_same_batch_names_collide_before_persisting() {
        let prompt = FixedPolicy(ConflictAction::Rename);
        let mut resolver = ConflictResolver::new(Vec::<String>::new());

        let first = resolver.resolve("x.txt", &prompt).await;
        let second = resolver.resolve("x.txt", &prompt).await;
        assert_eq!(first.name.as_deref(), Some("x.txt"));
        assert_eq!(second.name.as_deref(), Some("x_1.txt"));
    }

    #[tokio::test]
    async fn test_channel_prompt_round_trip() {
        let (prompt, mut rx) = ChannelPrompt::new(1);
        let answerer = tokio::spawn(async move {
            let query = rx.recv().await.unwrap();
            assert_eq!(query.name, "a.txt");
            assert!(query.is_batch);
            query
                .reply
                .send(ConflictDecision::for_all(ConflictAction::Overwrite))
                .unwrap();
        });

        let decision = prompt.resolve_conflict("a.txt", true).await;
        assert_eq!(decision, ConflictDecision::for_all(ConflictAction::Overwrite));
        answerer.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_prompt_closed_means_skip() {
        let (prompt, rx) = ChannelPrompt::new(1);
        drop(rx);
        let decision = prompt.resolve_conflict("a.txt", false).await;
        assert_eq!(decision.action, ConflictAction::Skip);
    }
}
