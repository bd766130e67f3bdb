//! Clone-or-pull for a monitored repository, via `git2` rather than
//! shelling out — the original used subprocess `git`.

use std::path::Path;

use git2::{FetchOptions, Repository};

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
}

/// Clone `clone_url`/`branch` into `local_path` if absent, otherwise fetch
/// and hard-reset to `origin/<branch>`. Returns the resulting HEAD SHA.
pub fn clone_or_pull(clone_url: &str, local_path: &Path, branch: &str) -> Result<String, GitError> {
    let repo = if local_path.join(".git").is_dir() {
        let repo = Repository::open(local_path)?;
        {
            let mut remote = repo.find_remote("origin")?;
            let mut fetch_opts = FetchOptions::new();
            remote.fetch(&[branch], Some(&mut fetch_opts), None)?;
        }
        let refname = format!("refs/remotes/origin/{branch}");
        let target = repo.find_reference(&refname)?.peel_to_commit()?;
        repo.reset(target.as_object(), git2::ResetType::Hard, None)?;
        repo
    } else {
        std::fs::create_dir_all(local_path).map_err(|e| GitError::Git(git2::Error::from_str(&e.to_string())))?;
        let mut builder = git2::build::RepoBuilder::new();
        builder.branch(branch);
        builder.clone(clone_url, local_path)?
    };

    let head = repo.head()?.peel_to_commit()?;
    Ok(head.id().to_string())
}

/// Most recent commit sha/author/date/message touching `rel_path`, if any.
pub fn file_git_meta(repo_path: &Path, rel_path: &str) -> Option<FileGitMeta> {
    let repo = Repository::open(repo_path).ok()?;
    let mut revwalk = repo.revwalk().ok()?;
    revwalk.push_head().ok()?;
    for oid in revwalk {
        let oid = oid.ok()?;
        let commit = repo.find_commit(oid).ok()?;
        let touches = commit_touches_path(&repo, &commit, rel_path).unwrap_or(false);
        if !touches {
            continue;
        }
        let author = commit.author();
        let mut message = commit.summary().unwrap_or_default().to_string();
        if message.chars().count() > 200 {
            message = message.chars().take(200).collect();
        }
        return Some(FileGitMeta {
            sha: commit.id().to_string(),
            author: author.name().unwrap_or_default().to_string(),
            date: commit.time().seconds(),
            message,
        });
    }
    None
}

fn commit_touches_path(repo: &Repository, commit: &git2::Commit, rel_path: &str) -> Result<bool, git2::Error> {
    let tree = commit.tree()?;
    if tree.get_path(Path::new(rel_path)).is_err() {
        return Ok(false);
    }
    if commit.parent_count() == 0 {
        return Ok(true);
    }
    let parent_tree = commit.parent(0)?.tree()?;
    let diff = repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?;
    let mut touched = false;
    diff.foreach(
        &mut |delta, _| {
            if delta.new_file().path() == Some(Path::new(rel_path)) {
                touched = true;
            }
            true
        },
        None,
        None,
        None,
    )?;
    Ok(touched)
}

#[derive(Debug, Clone)]
pub struct FileGitMeta {
    pub sha: String,
    pub author: String,
    pub date: i64,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init_bare_source(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        let sig = git2::Signature::now("Test Author", "test@example.com").unwrap();
        fs::write(dir.join("widget.py"), "def widget():\n    pass\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("widget.py")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "add widget", &tree, &[]).unwrap();
        repo
    }

    #[test]
    fn clone_then_pull_tracks_new_commits() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = init_bare_source(source_dir.path());
        let branch = source.head().unwrap().shorthand().unwrap().to_string();

        let clone_dir = tempfile::tempdir().unwrap();
        let local_path = clone_dir.path().join("checkout");
        let first_sha = clone_or_pull(source_dir.path().to_str().unwrap(), &local_path, &branch).unwrap();
        assert!(local_path.join("widget.py").is_file());

        let sig = git2::Signature::now("Test Author", "test@example.com").unwrap();
        fs::write(source_dir.path().join("widget.py"), "def widget():\n    return 1\n").unwrap();
        let mut index = source.index().unwrap();
        index.add_path(Path::new("widget.py")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = source.find_tree(tree_id).unwrap();
        let parent = source.head().unwrap().peel_to_commit().unwrap();
        source.commit(Some("HEAD"), &sig, &sig, "update widget", &tree, &[&parent]).unwrap();

        let second_sha = clone_or_pull(source_dir.path().to_str().unwrap(), &local_path, &branch).unwrap();
        assert_ne!(first_sha, second_sha);
        let content = fs::read_to_string(local_path.join("widget.py")).unwrap();
        assert!(content.contains("return 1"));
    }

    #[test]
    fn file_git_meta_finds_last_touching_commit() {
        let source_dir = tempfile::tempdir().unwrap();
        init_bare_source(source_dir.path());

        let meta = file_git_meta(source_dir.path(), "widget.py").unwrap();
        assert_eq!(meta.message, "add widget");
        assert_eq!(meta.author, "Test Author");

        assert!(file_git_meta(source_dir.path(), "missing.py").is_none());
    }
}
