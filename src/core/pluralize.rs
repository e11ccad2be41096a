//! Pluralization for route path segments
//!
//! Collection routes default to the plural of the resource name. Handles the
//! common English rules including consonant+y, sibilants and f/fe endings.

/// Utility for deriving the plural form of a resource name
pub struct Pluralizer;

impl Pluralizer {
    /// Convert a singular noun to its plural form
    ///
    /// # Examples
    ///
    /// ```
    /// use rudder::core::pluralize::Pluralizer;
    ///
    /// assert_eq!(Pluralizer::pluralize("article"), "articles");
    /// assert_eq!(Pluralizer::pluralize("category"), "categories");
    /// assert_eq!(Pluralizer::pluralize("address"), "addresses");
    /// ```
    pub fn pluralize(singular: &str) -> String {
        if singular.is_empty() {
            return singular.to_string();
        }

        match singular {
            // Consonant + y -> ies
            s if s.ends_with("y")
                && !s.ends_with("ay")
                && !s.ends_with("ey")
                && !s.ends_with("iy")
                && !s.ends_with("oy")
                && !s.ends_with("uy")
                && s.len() > 1 =>
            {
                format!("{}ies", &s[..s.len() - 1])
            }

            // s, ss, sh, ch, x, z -> es
            s if s.ends_with("s")
                || s.ends_with("sh")
                || s.ends_with("ch")
                || s.ends_with("x")
                || s.ends_with("z") =>
            {
                format!("{}es", s)
            }

            // fe -> ves
            s if s.ends_with("fe") && s.len() > 2 => {
                format!("{}ves", &s[..s.len() - 2])
            }

            // f -> ves
            s if s.ends_with("f") && s.len() > 1 => {
                format!("{}ves", &s[..s.len() - 1])
            }

            // Consonant + o -> es (photo, piano are exceptions)
            s if s.ends_with("o") && s.len() > 1 => {
                let before_o = s.chars().rev().nth(1).unwrap_or('a');
                if matches!(before_o, 'a' | 'e' | 'i' | 'o' | 'u') {
                    format!("{}s", s)
                } else {
                    match s {
                        "photo" | "piano" | "halo" => format!("{}s", s),
                        _ => format!("{}es", s),
                    }
                }
            }

            s => format!("{}s", s),
        }
    }
}
