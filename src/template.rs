//! Template-based random text generation.
//!
//! A grammar is a set of templates plus named variables, each with a set of
//! candidate substitutions. Placeholders look like `:name;`. Candidates may
//! reference other variables; a variable already on the current resolution
//! chain is left as its literal placeholder, which is what guarantees
//! termination for cyclic grammars.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Grammar as it appears in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    #[serde(default)]
    pub templates: Vec<String>,
    #[serde(default)]
    pub vars: BTreeMap<String, Vec<String>>,
}

/// Expands a [`Grammar`] into random text.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    templates: Vec<String>,
    vars: HashMap<String, Vec<String>>,
}

impl TemplateEngine {
    /// Build an engine. Duplicate templates and candidates are collapsed so
    /// selection is uniform over distinct values.
    pub fn new(grammar: &Grammar) -> Self {
        Self {
            templates: distinct(&grammar.templates),
            vars: grammar
                .vars
                .iter()
                .map(|(name, candidates)| (name.clone(), distinct(candidates)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Generate one message using the thread-local RNG.
    pub fn generate(&self) -> String {
        self.generate_with(&mut rand::rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let Some(template) = self.templates.choose(rng) else {
            return String::new();
        };
        self.substitute(template, &HashSet::new(), rng)
    }

    fn substitute<R: Rng + ?Sized>(
        &self,
        text: &str,
        visited: &HashSet<&str>,
        rng: &mut R,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(found) = next_placeholder(rest) {
            out.push_str(found.before);
            out.push_str(&self.resolve(found.name, visited, rng));
            rest = found.after;
        }
        out.push_str(rest);
        out
    }

    fn resolve<R: Rng + ?Sized>(
        &self,
        name: &str,
        visited: &HashSet<&str>,
        rng: &mut R,
    ) -> String {
        if visited.contains(name) {
            return literal(name);
        }
        let Some(candidate) = self.vars.get(name).and_then(|c| c.choose(&mut *rng)) else {
            return literal(name);
        };
        if next_placeholder(candidate).is_none() {
            return candidate.clone();
        }

        let mut chain: HashSet<&str> = visited.iter().copied().collect();
        chain.insert(name);
        self.substitute(candidate, &chain, rng)
    }
}

struct Placeholder<'a> {
    before: &'a str,
    name: &'a str,
    after: &'a str,
}

/// Leftmost `:name;` where `name` is one or more non-`;` characters.
fn next_placeholder(text: &str) -> Option<Placeholder<'_>> {
    let mut from = 0;
    while let Some(offset) = text[from..].find(':') {
        let start = from + offset;
        let tail = &text[start + 1..];
        match tail.find(';') {
            None => return None,
            Some(0) => from = start + 1,
            Some(end) => {
                return Some(Placeholder {
                    before: &text[..start],
                    name: &tail[..end],
                    after: &tail[end + 1..],
                });
            }
        }
    }
    None
}

fn literal(name: &str) -> String {
    format!(":{name};")
}

fn distinct(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect()
}
