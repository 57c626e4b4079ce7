//! Locale fallback policy.
//!
//! Every lookup that can miss a translation walks the same ordered chain:
//! the exact requested language, its base language (`fr-CA` → `fr`), then the
//! project default. Page lookup, item lookup, translation selection and section
//! data selection all go through [`LocaleChain`] so the policy cannot drift.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleChain {
    languages: Vec<String>,
}

impl LocaleChain {
    pub fn new(requested: &str, project_default: &str) -> Self {
        let mut languages: Vec<String> = Vec::with_capacity(3);
        let requested = requested.trim();
        let candidates = [
            Some(requested),
            base_language(requested),
            Some(project_default.trim()),
        ];
        for candidate in candidates.into_iter().flatten() {
            if candidate.is_empty() {
                continue;
            }
            if !languages
                .iter()
                .any(|existing| existing.eq_ignore_ascii_case(candidate))
            {
                languages.push(candidate.to_string());
            }
        }
        Self { languages }
    }

    pub fn requested(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("")
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Position of `language` in the chain. Language-neutral values (`None`) rank
    /// after every explicit language; languages outside the chain do not rank.
    pub fn rank(&self, language: Option<&str>) -> Option<usize> {
        match language {
            None => Some(self.languages.len()),
            Some(language) => self
                .languages
                .iter()
                .position(|candidate| candidate.eq_ignore_ascii_case(language)),
        }
    }

    /// Picks the candidate whose language ranks best. Ties keep the first candidate.
    pub fn pick_best<'a, T, F>(&self, candidates: impl IntoIterator<Item = &'a T>, language_of: F) -> Option<&'a T>
    where
        T: 'a,
        F: Fn(&T) -> Option<&str>,
    {
        let mut best: Option<(usize, &'a T)> = None;
        for candidate in candidates {
            let Some(rank) = self.rank(language_of(candidate)) else {
                continue;
            };
            match best {
                Some((best_rank, _)) if best_rank <= rank => {}
                _ => best = Some((rank, candidate)),
            }
        }
        best.map(|(_, candidate)| candidate)
    }
}

/// `fr-CA` → `fr`, `pt_BR` → `pt`; plain tags have no base.
pub fn base_language(language: &str) -> Option<&str> {
    let (base, _) = language.split_once(['-', '_'])?;
    (!base.is_empty()).then_some(base)
}
