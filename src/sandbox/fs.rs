use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

use super::error::SandboxError;

/// A single, Linux-flavored `stat` result for one path inside the sandbox.
#[derive(Debug, Clone)]
pub struct Stat {
    pub name: String,
    pub is_dir: bool,
    pub mode_string: String,
    pub nlink: u64,
    pub size: u64,
    pub mtime: DateTime<Local>,
    /// 512-byte block count, Linux `st_blocks` semantics.
    pub blocks: u64,
}

/// A filesystem view rooted at a real directory on disk.
///
/// Every path handed to its methods is treated as relative to `root`
/// regardless of a leading `/`; `..` segments are honored during
/// normalization but can never walk the result above `root`. An attempt to
/// do so returns `SandboxError::BackReference` instead of touching disk —
/// callers (the `cd`/`ls` commands) are expected to catch it and substitute
/// a root-confined path, per spec.
pub struct SandboxedFs {
    root: PathBuf,
}

impl SandboxedFs {
    /// Open (creating if necessary) a sandbox rooted at `root`. When
    /// `seed` is true and the root is newly created, the canonical Linux
    /// directory list is pre-created inside it.
    pub fn open(root: PathBuf, seed: bool) -> Result<Self, SandboxError> {
        let existed = root.exists();
        fs::create_dir_all(&root)?;
        let fs = SandboxedFs { root };
        if seed && !existed {
            fs.seed_directories()?;
        }
        Ok(fs)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn seed_directories(&self) -> Result<(), SandboxError> {
        for line in crate::data::LINUX_FS_LIST.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Ok(p) = self.resolve(line) {
                fs::create_dir_all(p)?;
            }
        }
        Ok(())
    }

    /// Resolve a guest path to an absolute host path, confined under `root`.
    ///
    /// This mirrors the component-walk approach the sandbox jail uses
    /// elsewhere in the fleet's code: normalize lexically first, and reject
    /// the moment a `..` would pop past the root rather than trying to
    /// detect escape after the fact.
    pub fn resolve(&self, guest_path: &str) -> Result<PathBuf, SandboxError> {
        let guest = Path::new(guest_path);
        let relative = guest.strip_prefix("/").unwrap_or(guest);

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(seg) => normalized.push(seg),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(SandboxError::BackReference(guest_path.to_string()));
                    }
                }
                _ => {}
            }
        }
        Ok(self.root.join(normalized))
    }

    /// Normalize a guest path the way `cd`/`ls` want: on back-reference
    /// escape, fall back to the sandbox root (`/`) instead of erroring.
    pub fn normalize_or_root(&self, working_path: &str, guest_path: &str) -> (String, PathBuf) {
        let joined = join_virtual(working_path, guest_path);
        match self.resolve(&joined) {
            Ok(host_path) => (joined, host_path),
            Err(_) => ("/".to_string(), self.root.clone()),
        }
    }

    pub fn exists(&self, guest_path: &str) -> bool {
        self.resolve(guest_path)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    pub fn isdir(&self, guest_path: &str) -> bool {
        self.resolve(guest_path).map(|p| p.is_dir()).unwrap_or(false)
    }

    pub fn isfile(&self, guest_path: &str) -> bool {
        self.resolve(guest_path).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn read_to_string(&self, guest_path: &str) -> Result<String, SandboxError> {
        let p = self.resolve(guest_path)?;
        Ok(fs::read_to_string(p)?)
    }

    pub fn makedir(&self, guest_path: &str) -> Result<(), SandboxError> {
        let p = self.resolve(guest_path)?;
        fs::create_dir_all(p)?;
        Ok(())
    }

    pub fn create(&self, guest_path: &str, bytes: &[u8]) -> Result<(), SandboxError> {
        let p = self.resolve(guest_path)?;
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(p, bytes)?;
        Ok(())
    }

    pub fn append(&self, guest_path: &str, bytes: &[u8]) -> Result<(), SandboxError> {
        use std::io::Write;
        let p = self.resolve(guest_path)?;
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = fs::OpenOptions::new().create(true).append(true).open(p)?;
        f.write_all(bytes)?;
        Ok(())
    }

    /// Lexicographically sorted directory entry names (not `.`/`..`).
    pub fn listdir(&self, guest_path: &str) -> Result<Vec<String>, SandboxError> {
        let p = self.resolve(guest_path)?;
        let mut names: Vec<String> = fs::read_dir(p)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn stat(&self, guest_path: &str) -> Result<Stat, SandboxError> {
        let p = self.resolve(guest_path)?;
        let name = Path::new(guest_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());
        stat_host_path(&p, name)
    }

    pub fn stat_at(&self, host_path: &Path, name: impl Into<String>) -> Result<Stat, SandboxError> {
        stat_host_path(host_path, name.into())
    }
}

fn stat_host_path(host_path: &Path, name: String) -> Result<Stat, SandboxError> {
    let meta = fs::metadata(host_path)?;
    let mtime = Local
        .timestamp_opt(meta.mtime(), 0)
        .single()
        .unwrap_or_else(Local::now);
    Ok(Stat {
        name,
        is_dir: meta.is_dir(),
        mode_string: format_mode(meta.mode(), meta.is_dir()),
        nlink: meta.nlink(),
        size: meta.size(),
        mtime,
        blocks: meta.blocks(),
    })
}

/// Join a guest-relative path onto a working path the way `os.path.join` +
/// `os.path.normpath` would, without touching disk. Used before resolving
/// against the sandbox root so callers can report back the virtual path
/// they ended up at.
pub fn join_virtual(working_path: &str, guest_path: &str) -> String {
    let base = if guest_path.starts_with('/') {
        PathBuf::from("/")
    } else {
        PathBuf::from(working_path)
    };
    let mut stack: Vec<String> = Vec::new();
    for comp in base.join(guest_path).components() {
        match comp {
            Component::Normal(seg) => stack.push(seg.to_string_lossy().to_string()),
            Component::ParentDir => {
                stack.pop();
            }
            _ => {}
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Render a Linux-style mode string, e.g. `drwxr-xr-x`, the way
/// `tarfile.filemode` does in the original implementation.
pub fn format_mode(mode: u32, is_dir: bool) -> String {
    const PERM_CHARS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    let mut s = String::with_capacity(10);
    s.push(if is_dir { 'd' } else { '-' });
    for (bit, ch) in PERM_CHARS {
        s.push(if mode & bit != 0 { ch } else { '-' });
    }
    s
}
