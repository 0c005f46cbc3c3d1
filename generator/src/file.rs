// Copyright 2024 Metagen project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

use crate::model::Object;
use crate::Generator;

// Directory for hidden output files when the `hidden` attribute is unset.
const HIDDEN_DEFAULT: &str = ".corto";

///
/// A user-authored region inside a generated file, preserved across
/// regenerations. Islands are delimited by `<option>(<id>)` and `$end`
/// lines, with option one of `$header`, `$begin`, `$body`.
///
#[derive(Clone, Debug)]
struct Snippet {
    option: String,
    id: String,
    src: String,
    used: bool,
}

#[derive(Debug)]
struct FileInner<O> {
    path: PathBuf,
    out: File,
    indent: u32,
    scope: Option<O>,
    // If the last written character was a newline, the next write must
    // insert indentation.
    end_line: bool,
    headers: Vec<Snippet>,
    snippets: Vec<Snippet>,
}

///
/// An open output file. Handles are cheap clones of one shared file: the
/// host keeps one in its open-file list for teardown, drivers hold others
/// across callbacks.
///
#[derive(Clone, Debug)]
pub struct GenFile<O: Object> {
    inner: Arc<Mutex<FileInner<O>>>,
}

impl<O: Object> GenFile<O> {
    ///
    /// Writes `text`, prefixing the indentation of the current level when
    /// the previous write ended a line.
    ///
    pub fn write(&self, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        if inner.indent > 0 && inner.end_line {
            write!(inner.out, "{:width$}", "", width = (inner.indent * 4) as usize)?;
        }
        inner.out.write_all(text.as_bytes())?;
        inner.end_line = text.ends_with('\n');
        Ok(())
    }

    /// Increases indentation.
    pub fn indent(&self) {
        self.inner.lock().indent += 1;
    }

    /// Decreases indentation.
    pub fn dedent(&self) {
        let mut inner = self.inner.lock();
        assert!(inner.indent > 0, "dedent without matching indent");
        inner.indent -= 1;
    }

    pub fn set_scope(&self, scope: Option<O>) {
        self.inner.lock().scope = scope;
    }

    pub fn scope(&self) -> Option<O> {
        self.inner.lock().scope.clone()
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    ///
    /// Looks up a `$begin`/`$body` island preserved from the previous copy
    /// of this file and marks it as referenced.
    ///
    pub fn lookup_snippet(&self, id: &str) -> Option<String> {
        lookup(&mut self.inner.lock().snippets, id)
    }

    ///
    /// Looks up a `$header` island preserved from the previous copy of this
    /// file and marks it as referenced.
    ///
    pub fn lookup_header(&self, id: &str) -> Option<String> {
        lookup(&mut self.inner.lock().headers, id)
    }

    ///
    /// Re-emits every island the regenerated content did not reference, so
    /// user-authored code survives even when its anchor disappeared. Called
    /// when the file is closed.
    ///
    pub(crate) fn flush_unused(&self) -> io::Result<()> {
        let (path, islands) = {
            let mut inner = self.inner.lock();
            let mut islands: Vec<Snippet> = inner.snippets.drain(..).collect();
            islands.extend(inner.headers.drain(..));
            (inner.path.clone(), islands)
        };

        for island in islands.into_iter().filter(|island| !island.used) {
            warn!(
                "{}: code island '{}' is not used, manually merge or remove it",
                path.display(),
                island.id
            );
            self.write(&format!(
                "{}({})\n{}$end\n",
                island.option, island.id, island.src
            ))?;
        }

        Ok(())
    }
}

// Id comparison ignores one leading scope separator and ASCII case.
fn lookup(list: &mut [Snippet], id: &str) -> Option<String> {
    let want = id.strip_prefix('/').unwrap_or(id);
    for snippet in list.iter_mut() {
        let have = snippet.id.strip_prefix('/').unwrap_or(&snippet.id);
        if have.eq_ignore_ascii_case(want) || snippet.id == id {
            snippet.used = true;
            return Some(snippet.src.clone());
        }
    }
    None
}

///
/// If an expected output is missing but a `<name>.old` rename-recovery copy
/// exists, restore it before parsing islands.
///
fn recover_old(path: &Path) {
    if path.exists() {
        return;
    }

    let mut old = path.as_os_str().to_owned();
    old.push(".old");
    let old = PathBuf::from(old);
    if old.exists() {
        if let Err(err) = fs::rename(&old, path) {
            warn!(
                "could not rename '{}' to '{}': {}",
                old.display(),
                path.display(),
                err
            );
        }
    }
}

///
/// Collects the islands opened by `option` lines from a pre-existing copy of
/// the file. A missing file yields no islands; malformed delimiters are
/// reported but only a nested `$begin` is fatal.
///
fn load_islands(path: &Path, option: &str, out: &mut Vec<Snippet>) -> Result<(), String> {
    let Ok(code) = fs::read_to_string(path) else {
        return Ok(());
    };

    let mut lines = code.lines();
    while let Some(line) = lines.next() {
        let Some(marker) = line.find(option) else {
            continue;
        };
        let after = &line[marker + option.len()..];

        let Some(after) = after.strip_prefix('(') else {
            warn!("{}: missing '(' after {}", path.display(), option);
            continue;
        };
        let Some(close) = after.find(')') else {
            warn!("{}: missing ')' after {}(", path.display(), option);
            continue;
        };
        let id = &after[..close];

        let mut src = String::new();
        let mut terminated = false;
        for line in lines.by_ref() {
            if line.contains("$end") {
                terminated = true;
                break;
            }
            if line.contains("$begin") {
                return Err(format!(
                    "{}: code island '{}({})' contains a nested $begin (did you forget an $end?)",
                    path.display(),
                    option,
                    id
                ));
            }
            src.push_str(line);
            src.push('\n');
        }

        if !terminated {
            warn!("{}: missing $end after {}({})", path.display(), option, id);
            break;
        }

        out.push(Snippet {
            option: option.to_string(),
            id: id.to_string(),
            src,
            used: false,
        });
    }

    Ok(())
}

impl<O: Object> Generator<O> {
    ///
    /// Opens a file for writing, preserving the code islands of any previous
    /// copy. The file lands in the directory named by the attribute matching
    /// its extension, when one is set.
    ///
    pub fn open_file(&mut self, name: &str) -> Result<GenFile<O>, String> {
        let path = self.file_path(name);
        self.open_file_at(path)
    }

    ///
    /// Opens a file under the hidden-output directory.
    ///
    pub fn open_hidden_file(&mut self, name: &str) -> Result<GenFile<O>, String> {
        let path = self.hidden_file_path(name);
        self.open_file_at(path)
    }

    ///
    /// The path a file of this name is generated at, honoring the
    /// extension-directory attributes (e.g. the `h` attribute names the
    /// directory for `.h` files).
    ///
    pub fn file_path(&self, name: &str) -> PathBuf {
        if let Some(ext) = Path::new(name).extension().and_then(|ext| ext.to_str()) {
            let dir = self.attribute(ext);
            if !dir.is_empty() {
                return PathBuf::from(dir).join(name);
            }
        }
        PathBuf::from(name)
    }

    ///
    /// The path a hidden file of this name is generated at.
    ///
    pub fn hidden_file_path(&self, name: &str) -> PathBuf {
        let hidden = self.attribute("hidden");
        let hidden = if hidden.is_empty() {
            HIDDEN_DEFAULT
        } else {
            hidden
        };
        PathBuf::from(hidden).join(name)
    }

    ///
    /// The contents of a previously generated file.
    ///
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.file_path(name))
    }

    ///
    /// Finds an already-open output file by name.
    ///
    pub fn lookup_file(&self, name: &str) -> Option<GenFile<O>> {
        let path = self.file_path(name);
        self.files.iter().find(|file| file.path() == path).cloned()
    }

    ///
    /// Closes an output file, re-emitting unused code islands.
    ///
    pub fn close_file(&mut self, file: GenFile<O>) -> Result<(), String> {
        self.files
            .retain(|open| !Arc::ptr_eq(&open.inner, &file.inner));
        file.flush_unused()
            .map_err(|err| format!("'{}': {}", file.path().display(), err))
    }

    fn open_file_at(&mut self, path: PathBuf) -> Result<GenFile<O>, String> {
        recover_old(&path);

        let mut headers = Vec::new();
        let mut snippets = Vec::new();
        load_islands(&path, "$header", &mut headers)?;
        load_islands(&path, "$begin", &mut snippets)?;
        load_islands(&path, "$body", &mut snippets)?;

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|err| format!("'{}': {}", dir.display(), err))?;
            }
        }
        let out =
            File::create(&path).map_err(|err| format!("'{}': {}", path.display(), err))?;

        let file = GenFile {
            inner: Arc::new(Mutex::new(FileInner {
                path,
                out,
                indent: 0,
                scope: None,
                end_line: true,
                headers,
                snippets,
            })),
        };
        self.files.push(file.clone());
        Ok(file)
    }
}
