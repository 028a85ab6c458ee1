//! Building, parsing and walking commit objects.
//!
//! A commit's content is UTF-8 text: a `tree` line, one `parent` line
//! per parent, an `author` and a `committer` line each carrying name,
//! email, unix timestamp and a signed `HHMM` UTC offset, a blank line,
//! then the message with exactly one trailing newline.
//!
//! History is append-only: a new commit points at prior commits and no
//! stored commit is ever mutated.

use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::error::{Error, Result};
use crate::index::Index;
use crate::object::{load_object, store_object, Object};
use crate::refs::RefStore;
use crate::repository::Repository;
use crate::tree::write_tree_from_index;
use crate::types::{ObjectId, ObjectKind};

/// Who is committing. Name and email arrive pre-validated by the
/// identity-resolution collaborator: no newlines, no angle brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// An author or committer line: identity plus a moment in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// seconds since the unix epoch
    pub timestamp: i64,
    /// local offset from UTC, in minutes
    pub offset_minutes: i32,
}

impl Signature {
    pub fn new(identity: &Identity, when: DateTime<FixedOffset>) -> Self {
        Self {
            name: identity.name.clone(),
            email: identity.email.clone(),
            timestamp: when.timestamp(),
            offset_minutes: when.offset().local_minus_utc() / 60,
        }
    }

    /// the signed `HHMM` form used in commit text
    pub fn format_offset(&self) -> String {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let mins = self.offset_minutes.abs();
        format!("{}{:02}{:02}", sign, mins / 60, mins % 60)
    }

    fn parse_offset(s: &str) -> Result<i32> {
        let bad = || Error::MalformedCommit(format!("bad utc offset: {}", s));

        if s.len() != 5 {
            return Err(bad());
        }
        let sign = match &s[..1] {
            "+" => 1,
            "-" => -1,
            _ => return Err(bad()),
        };
        let hours: i32 = s[1..3].parse().map_err(|_| bad())?;
        let minutes: i32 = s[3..5].parse().map_err(|_| bad())?;

        Ok(sign * (hours * 60 + minutes))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp,
            self.format_offset()
        )
    }
}

/// A parsed commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

/// the current local time as a fixed-offset timestamp, for callers that
/// don't carry their own clock
pub fn local_now() -> DateTime<FixedOffset> {
    chrono::Local::now().fixed_offset()
}

/// Build a commit object over an existing tree.
///
/// Validates that `tree` resolves to a tree and every parent to a
/// commit before formatting the body. The result is not yet stored.
pub fn build_commit(
    repo: &Repository,
    tree: &ObjectId,
    parents: &[ObjectId],
    message: &str,
    identity: &Identity,
    when: DateTime<FixedOffset>,
) -> Result<Object> {
    let obj = load_object(repo, &tree.to_hex())?;
    if obj.kind != ObjectKind::Tree {
        return Err(Error::NotATree(tree.to_hex()));
    }

    let mut contents = format!("tree {}\n", tree);

    for parent in parents {
        let obj = load_object(repo, &parent.to_hex())?;
        if obj.kind != ObjectKind::Commit {
            return Err(Error::NotACommit(parent.to_hex()));
        }
        contents.push_str(&format!("parent {}\n", parent));
    }

    let signature = Signature::new(identity, when);
    contents.push_str(&format!("author {}\n", signature));
    contents.push_str(&format!("committer {}\n\n", signature));
    contents.push_str(&format!("{}\n", message.trim_end()));

    Ok(Object::new(ObjectKind::Commit, contents.into_bytes()))
}

/// Parse a stored commit object.
pub fn parse_commit(obj: &Object) -> Result<Commit> {
    if obj.kind != ObjectKind::Commit {
        return Err(Error::NotACommit(obj.id().to_hex()));
    }

    let text = String::from_utf8(obj.content.clone())?;
    let (header, message) = text
        .split_once("\n\n")
        .ok_or_else(|| Error::MalformedCommit("missing blank line".to_string()))?;
    let message = message.trim_end_matches('\n').to_string();

    let missing = || Error::MalformedCommit("truncated header".to_string());
    let mut lines = header.lines();

    let tree = lines
        .next()
        .ok_or_else(missing)?
        .strip_prefix("tree ")
        .ok_or_else(|| Error::MalformedCommit("missing tree line".to_string()))?;
    let tree = ObjectId::from_hex(tree.trim())?;

    let mut parents = Vec::new();
    let mut line = lines.next().ok_or_else(missing)?;
    while let Some(parent) = line.strip_prefix("parent ") {
        parents.push(ObjectId::from_hex(parent.trim())?);
        line = lines.next().ok_or_else(missing)?;
    }

    let author = parse_signature(line, "author")?;
    let committer = parse_signature(lines.next().ok_or_else(missing)?, "committer")?;

    Ok(Commit {
        id: obj.id(),
        tree,
        parents,
        author,
        committer,
        message,
    })
}

/// Parse `<keyword> <name> <email> <timestamp> <offset>`.
///
/// The name is everything between the keyword and the email's angle
/// brackets, so names with embedded spaces survive.
fn parse_signature(line: &str, keyword: &str) -> Result<Signature> {
    let bad = |what: &str| Error::MalformedCommit(format!("{} in {} line", what, keyword));

    let rest = line
        .strip_prefix(keyword)
        .and_then(|r| r.strip_prefix(' '))
        .ok_or_else(|| bad("missing keyword"))?;

    let open = rest.rfind('<').ok_or_else(|| bad("missing email"))?;
    let close = rest.rfind('>').ok_or_else(|| bad("missing email"))?;
    if close < open {
        return Err(bad("mismatched email brackets"));
    }

    let name = rest[..open].trim().to_string();
    let email = rest[open + 1..close].to_string();

    let mut tail = rest[close + 1..].split_whitespace();
    let timestamp: i64 = tail
        .next()
        .ok_or_else(|| bad("missing timestamp"))?
        .parse()
        .map_err(|_| bad("bad timestamp"))?;
    let offset_minutes =
        Signature::parse_offset(tail.next().ok_or_else(|| bad("missing offset"))?)?;

    Ok(Signature {
        name,
        email,
        timestamp,
        offset_minutes,
    })
}

/// Commit the current index: write its tree, use HEAD's target as the
/// sole parent, store the commit and advance the resolved ref.
///
/// A branch that has no commits yet yields a parentless initial commit.
pub fn write_commit(
    repo: &Repository,
    message: &str,
    identity: &Identity,
    when: DateTime<FixedOffset>,
) -> Result<ObjectId> {
    let index = Index::read(repo)?;
    let tree_id = write_tree_from_index(repo, &index)?;

    let refname = RefStore::read_symbolic_ref(repo)?;
    let parents = match RefStore::resolve(repo, &refname) {
        Ok(id) => vec![id],
        Err(Error::RefNotFound(_)) => Vec::new(),
        Err(e) => return Err(e),
    };

    let obj = build_commit(repo, &tree_id, &parents, message, identity, when)?;
    let id = store_object(repo, &obj)?;
    RefStore::update(repo, &refname, &id)?;

    Ok(id)
}

/// Lazy first-parent walk over commit ancestry, terminating at a commit
/// with no parents.
pub fn history(repo: &Repository, start: ObjectId) -> CommitIter<'_> {
    CommitIter {
        repo,
        next: Some(start),
    }
}

pub struct CommitIter<'a> {
    repo: &'a Repository,
    next: Option<ObjectId>,
}

impl Iterator for CommitIter<'_> {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;

        let result = load_object(self.repo, &id.to_hex()).and_then(|obj| parse_commit(&obj));
        if let Ok(commit) = &result {
            self.next = commit.parents.first().copied();
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::HEAD;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn fixed_when() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .timestamp_opt(1_700_000_000, 0)
            .unwrap()
    }

    fn identity() -> Identity {
        Identity::new("Alice Example", "alice@example.com")
    }

    fn store_empty_tree(repo: &Repository) -> ObjectId {
        store_object(repo, &Object::new(ObjectKind::Tree, Vec::new())).unwrap()
    }

    #[test]
    fn test_build_commit_format() {
        let (_dir, repo) = test_repo();
        let tree = store_empty_tree(&repo);

        let obj = build_commit(&repo, &tree, &[], "initial\n\n", &identity(), fixed_when()).unwrap();

        let expected = format!(
            "tree {}\n\
             author Alice Example <alice@example.com> 1700000000 +0000\n\
             committer Alice Example <alice@example.com> 1700000000 +0000\n\
             \n\
             initial\n",
            tree
        );
        assert_eq!(obj.content, expected.as_bytes());
        assert_eq!(obj.kind, ObjectKind::Commit);
    }

    #[test]
    fn test_build_commit_rejects_non_tree() {
        let (_dir, repo) = test_repo();
        let blob =
            store_object(&repo, &Object::new(ObjectKind::Blob, b"x".to_vec())).unwrap();

        let result = build_commit(&repo, &blob, &[], "msg", &identity(), fixed_when());
        assert!(matches!(result, Err(Error::NotATree(_))));
    }

    #[test]
    fn test_build_commit_rejects_non_commit_parent() {
        let (_dir, repo) = test_repo();
        let tree = store_empty_tree(&repo);

        let result = build_commit(&repo, &tree, &[tree], "msg", &identity(), fixed_when());
        assert!(matches!(result, Err(Error::NotACommit(_))));
    }

    #[test]
    fn test_parse_commit_roundtrip() {
        let (_dir, repo) = test_repo();
        let tree = store_empty_tree(&repo);

        let ident = Identity::new("Alice B. Chainsaw", "alice@example.com");
        let obj = build_commit(&repo, &tree, &[], "hello world", &ident, fixed_when()).unwrap();
        let commit = parse_commit(&obj).unwrap();

        assert_eq!(commit.tree, tree);
        assert!(commit.parents.is_empty());
        // a name with embedded spaces parses intact
        assert_eq!(commit.author.name, "Alice B. Chainsaw");
        assert_eq!(commit.author.email, "alice@example.com");
        assert_eq!(commit.author.timestamp, 1_700_000_000);
        assert_eq!(commit.author.offset_minutes, 0);
        assert_eq!(commit.committer, commit.author);
        assert_eq!(commit.message, "hello world");
        assert_eq!(commit.id, obj.id());
    }

    #[test]
    fn test_offset_parsing() {
        assert_eq!(Signature::parse_offset("+0000").unwrap(), 0);
        assert_eq!(Signature::parse_offset("+0530").unwrap(), 330);
        assert_eq!(Signature::parse_offset("-0800").unwrap(), -480);
        assert!(Signature::parse_offset("0000").is_err());
        assert!(Signature::parse_offset("+08").is_err());
    }

    #[test]
    fn test_offset_formatting() {
        let mut sig = Signature::new(&identity(), fixed_when());
        assert_eq!(sig.format_offset(), "+0000");
        sig.offset_minutes = 330;
        assert_eq!(sig.format_offset(), "+0530");
        sig.offset_minutes = -480;
        assert_eq!(sig.format_offset(), "-0800");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let obj = Object::new(ObjectKind::Commit, b"tree oops".to_vec());
        assert!(matches!(
            parse_commit(&obj),
            Err(Error::MalformedCommit(_))
        ));

        let obj = Object::new(ObjectKind::Blob, b"data".to_vec());
        assert!(matches!(parse_commit(&obj), Err(Error::NotACommit(_))));
    }

    #[test]
    fn test_write_commit_and_history() {
        let (_dir, repo) = test_repo();
        let ident = identity();

        let first = write_commit(&repo, "one", &ident, fixed_when()).unwrap();
        let second = write_commit(&repo, "two", &ident, fixed_when()).unwrap();
        let third = write_commit(&repo, "three", &ident, fixed_when()).unwrap();

        assert_eq!(RefStore::resolve(&repo, HEAD).unwrap(), third);

        let commits: Vec<Commit> = history(&repo, third)
            .collect::<Result<Vec<_>>>()
            .unwrap();

        // child-to-root order, terminating at the parentless root
        assert_eq!(commits.len(), 3);
        assert_eq!(commits[0].id, third);
        assert_eq!(commits[0].message, "three");
        assert_eq!(commits[1].id, second);
        assert_eq!(commits[2].id, first);
        assert!(commits[2].parents.is_empty());
        assert_eq!(commits[1].parents, vec![first]);
    }
}
