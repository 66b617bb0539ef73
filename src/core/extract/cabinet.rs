// ─── Cabinet chains ───
// A first cabinet followed by numbered continuation cabinets
// (`data1.cab`, `data2.cab`, ... or `disk1.cab`, `disk2.cab`, ...).

use std::collections::HashMap;
use std::fs::File;
use std::path::{Component as PathComponent, Path, PathBuf};

use tracing::{debug, info};

use super::ExtractedEntry;
use crate::core::error::{InstallError, InstallResult};

/// A historically used cabinet naming scheme: `<prefix><n>.cab`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CabinetNaming {
    pub prefix: &'static str,
}

/// Conventions tried, in order, when looking for the first cabinet.
pub const NAMING_CONVENTIONS: [CabinetNaming; 2] = [
    CabinetNaming { prefix: "data" },
    CabinetNaming { prefix: "disk" },
];

impl CabinetNaming {
    pub fn file_name(&self, number: usize) -> String {
        format!("{}{}.cab", self.prefix, number)
    }

    fn matches_first(&self, file_name: &str) -> bool {
        file_name.eq_ignore_ascii_case(&self.file_name(1))
    }
}

/// Resolve the ordered list of cabinets making up the chain at `source`.
///
/// `source` is either a directory holding the chain or the first cabinet itself.
pub fn resolve_chain(source: &Path) -> InstallResult<Vec<PathBuf>> {
    let (dir, first_name) = if source.is_dir() {
        (source.to_path_buf(), None)
    } else {
        let dir = source.parent().map(Path::to_path_buf).unwrap_or_default();
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        (dir, name)
    };

    let listing = list_dir_case_insensitive(&dir)?;

    let naming = match &first_name {
        Some(name) => {
            if !source.is_file() {
                return Err(InstallError::Archive(format!(
                    "cabinet not found: {}",
                    source.display()
                )));
            }
            NAMING_CONVENTIONS
                .iter()
                .find(|n| n.matches_first(name))
                .copied()
        }
        None => NAMING_CONVENTIONS
            .iter()
            .find(|n| listing.contains_key(&n.file_name(1)))
            .copied(),
    };

    let Some(naming) = naming else {
        if first_name.is_some() {
            // A lone cabinet outside the known schemes has no continuations.
            return Ok(vec![source.to_path_buf()]);
        }
        return Err(InstallError::CabinetNotFound {
            dir,
            tried: NAMING_CONVENTIONS.iter().map(|n| n.file_name(1)).collect(),
        });
    };

    let mut chain = Vec::new();
    let mut number = 1;
    while let Some(path) = listing.get(&naming.file_name(number)) {
        chain.push(path.clone());
        number += 1;
    }
    Ok(chain)
}

/// Expand every cabinet of the chain into `destination`, in order.
pub fn extract_cabinet_chain(
    source: &Path,
    destination: &Path,
    on_entry: &mut dyn FnMut(ExtractedEntry),
) -> InstallResult<usize> {
    let chain = resolve_chain(source)?;
    info!("Expanding cabinet chain of {} file(s)", chain.len());

    let mut extracted = 0;
    for cab_path in &chain {
        extracted += extract_cabinet(cab_path, destination, extracted, on_entry)?;
    }
    Ok(extracted)
}

fn extract_cabinet(
    cab_path: &Path,
    destination: &Path,
    offset: usize,
    on_entry: &mut dyn FnMut(ExtractedEntry),
) -> InstallResult<usize> {
    let file = File::open(cab_path).map_err(|e| {
        InstallError::Archive(format!("cannot open cabinet {}: {e}", cab_path.display()))
    })?;
    let mut cabinet = cab::Cabinet::new(file).map_err(|e| {
        InstallError::Archive(format!("corrupt cabinet {}: {e}", cab_path.display()))
    })?;

    let names: Vec<String> = cabinet
        .folder_entries()
        .flat_map(|folder| folder.file_entries())
        .map(|entry| entry.name().to_string())
        .collect();

    let mut extracted = 0;
    for name in names {
        let rel_path = sanitize_entry_name(&name)?;
        let out_path = destination.join(&rel_path);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
        }

        let mut reader = cabinet.read_file(&name).map_err(|e| {
            InstallError::Archive(format!("cannot read {name} from {}: {e}", cab_path.display()))
        })?;
        let mut out = File::create(&out_path).map_err(|e| InstallError::io(&out_path, e))?;
        std::io::copy(&mut reader, &mut out).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                InstallError::Archive(format!("corrupt entry {name}: {e}"))
            }
            _ => InstallError::io(&out_path, e),
        })?;

        debug!("Expanded {:?}", out_path);
        extracted += 1;
        on_entry(ExtractedEntry {
            name: rel_path.to_string_lossy().replace('\\', "/"),
            index: offset + extracted,
        });
    }
    Ok(extracted)
}

/// Cabinet names use `\` separators; reject anything escaping the destination.
fn sanitize_entry_name(name: &str) -> InstallResult<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut rel = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            PathComponent::Normal(part) => rel.push(part),
            PathComponent::CurDir => {}
            _ => {
                return Err(InstallError::Archive(format!(
                    "unsafe entry path in cabinet: {name}"
                )))
            }
        }
    }
    if rel.as_os_str().is_empty() {
        return Err(InstallError::Archive(format!("empty entry name in cabinet: {name:?}")));
    }
    Ok(rel)
}

fn list_dir_case_insensitive(dir: &Path) -> InstallResult<HashMap<String, PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        InstallError::Archive(format!("cannot read cabinet directory {}: {e}", dir.display()))
    })?;
    let mut listing = HashMap::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            let key = entry.file_name().to_string_lossy().to_ascii_lowercase();
            listing.insert(key, path);
        }
    }
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::test_support::cab_bytes;

    #[test]
    fn finds_chain_under_first_convention() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=3 {
            std::fs::write(dir.path().join(format!("Data{n}.cab")), b"").unwrap();
        }
        std::fs::write(dir.path().join("Data5.cab"), b"").unwrap();

        let chain = resolve_chain(dir.path()).unwrap();
        let names: Vec<_> = chain
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["Data1.cab", "Data2.cab", "Data3.cab"]);
    }

    #[test]
    fn falls_back_to_second_convention() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("disk1.cab"), b"").unwrap();

        let chain = resolve_chain(dir.path()).unwrap();
        assert_eq!(chain, vec![dir.path().join("disk1.cab")]);
    }

    #[test]
    fn missing_first_cabinet_names_both_conventions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data2.cab"), b"").unwrap();

        let err = resolve_chain(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Archive);
        match err {
            InstallError::CabinetNotFound { tried, .. } => {
                assert_eq!(tried, vec!["data1.cab", "disk1.cab"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn expands_every_cabinet_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("cabs");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(
            source.join("data1.cab"),
            cab_bytes(&[("iw3mp.exe", b"MZ"), ("main\\iw_00.iwd", b"one")]),
        )
        .unwrap();
        std::fs::write(source.join("data2.cab"), cab_bytes(&[("zone\\english\\code.ff", b"two")]))
            .unwrap();
        let dest = dir.path().join("game");
        std::fs::create_dir(&dest).unwrap();

        let mut seen = Vec::new();
        let count = extract_cabinet_chain(&source, &dest, &mut |e| seen.push((e.index, e.name)))
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            seen,
            vec![
                (1, "iw3mp.exe".to_string()),
                (2, "main/iw_00.iwd".to_string()),
                (3, "zone/english/code.ff".to_string()),
            ]
        );
        assert_eq!(std::fs::read(dest.join("zone/english/code.ff")).unwrap(), b"two");
    }

    #[test]
    fn rejects_escaping_entry_names() {
        assert!(sanitize_entry_name("..\\evil.dll").is_err());
        assert_eq!(
            sanitize_entry_name("main\\iw_00.iwd").unwrap(),
            PathBuf::from("main").join("iw_00.iwd")
        );
    }
}
