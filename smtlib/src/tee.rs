// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Record SMT output and save to a file for debugging purposes.

use std::{
    collections::hash_map::DefaultHasher,
    fs::{self, OpenOptions},
    hash::{Hash, Hasher},
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::sexp::Sexp;

/// Track and save SMT sent to solver so far.
#[derive(Debug)]
pub struct Tee {
    dir: PathBuf,
    contents: Vec<Sexp>,
}

fn calculate_hash<T: Hash>(v: T) -> String {
    let mut hash_state = DefaultHasher::new();
    v.hash(&mut hash_state);
    let h = hash_state.finish();
    format!("{h:016x}")[..8].to_string()
}

impl Tee {
    /// Create a new empty `Tee` which saves queries to `dir`.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            contents: vec![],
        }
    }

    /// Append a raw s-expression sent to solver.
    pub fn append(&mut self, s: Sexp) {
        self.contents.push(s)
    }

    fn render(&self) -> String {
        self.contents
            .iter()
            .map(|s| match s {
                Sexp::Comment(c) if c.is_empty() => "".to_string(),
                Sexp::Comment(c) => format!(";; {c}"),
                _ => s.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Save the SMT2 input currently sent to the solver to a file named by its
    /// content hash. Returns the saved file name.
    pub fn save(&self) -> io::Result<PathBuf> {
        let contents = self.render();
        let fname = PathBuf::from(format!("query-{}.smt2", calculate_hash(&contents)));
        fs::create_dir_all(&self.dir)?;
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.dir.join(&fname))?;
        writeln!(&mut f, "{contents}")?;
        Ok(fname)
    }
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use super::Tee;
    use crate::sexp::{app, atom_s, Sexp};

    #[test]
    fn test_save_is_content_addressed() {
        let dir = env::temp_dir().join(format!("smtlib-tee-{}", std::process::id()));
        let mut tee = Tee::new(&dir);
        tee.append(Sexp::Comment("init".to_string()));
        tee.append(app("check-sat", []));
        let first = tee.save().unwrap();
        let second = tee.save().unwrap();
        assert_eq!(first, second);
        let contents = fs::read_to_string(dir.join(&first)).unwrap();
        assert_eq!(contents, ";; init\n(check-sat)\n");

        tee.append(app("get-value", [atom_s("x")]));
        assert_ne!(tee.save().unwrap(), first);
        fs::remove_dir_all(&dir).unwrap();
    }
}
