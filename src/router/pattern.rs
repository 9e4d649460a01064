use std::fmt;
use std::sync::Arc;

use regex::Regex;
use smallvec::SmallVec;

use super::RouteError;

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Captured path parameters in the order the pattern declares them.
///
/// Names are shared with the compiled matcher; values are per request.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// A path specification as given at registration.
#[derive(Debug, Clone)]
pub enum PathSpec {
    /// A template such as `/user/:id`, `/files/*` or `*`.
    Template(String),
    /// A precompiled pattern, used as is.
    Pattern(Regex),
}

/// The identity of a [`PathSpec`] inside one routing unit.
///
/// Two registrations share a route entry exactly when their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecKey {
    Template(String),
    Pattern(String),
}

impl PathSpec {
    pub fn key(&self) -> SpecKey {
        match self {
            PathSpec::Template(t) => SpecKey::Template(t.clone()),
            PathSpec::Pattern(re) => SpecKey::Pattern(re.as_str().to_string()),
        }
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSpec::Template(t) => f.write_str(t),
            PathSpec::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for PathSpec {
    fn from(s: &str) -> Self {
        PathSpec::Template(s.to_string())
    }
}

impl From<String> for PathSpec {
    fn from(s: String) -> Self {
        PathSpec::Template(s)
    }
}

impl From<&String> for PathSpec {
    fn from(s: &String) -> Self {
        PathSpec::Template(s.clone())
    }
}

impl From<Regex> for PathSpec {
    fn from(re: Regex) -> Self {
        PathSpec::Pattern(re)
    }
}

#[derive(Debug, Clone)]
enum MatcherKind {
    Everything,
    Compiled {
        regex: Regex,
        /// Capture group index and parameter name, in declaration order.
        groups: Vec<(usize, Arc<str>)>,
    },
}

/// A compiled path matcher.
///
/// Matching is a pure function of the request path.
#[derive(Debug, Clone)]
pub struct Matcher {
    kind: MatcherKind,
}

impl Matcher {
    /// Compile a path specification.
    ///
    /// Template grammar:
    ///
    /// - literal text matches itself (ignoring ASCII case unless `case_sensitive`)
    /// - `:name` matches one non-empty segment
    /// - `:name?` makes the segment, and the `/` before it, optional
    /// - `:name(expr)` constrains the segment with a custom expression
    /// - `*` matches any run of characters and captures nothing
    /// - the template `*` on its own matches every path
    ///
    /// A trailing `/` on the request path is always optional.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::MalformedTemplate`] for a template outside this
    /// grammar (a missing parameter name, unbalanced parentheses, `+`/`*`
    /// modifiers, unnamed groups) and [`RouteError::InvalidPattern`] when a
    /// custom expression is not a valid regex.
    pub fn compile(spec: &PathSpec, case_sensitive: bool) -> Result<Matcher, RouteError> {
        match spec {
            PathSpec::Template(t) if t == "*" => Ok(Matcher {
                kind: MatcherKind::Everything,
            }),
            PathSpec::Template(t) => compile_template(t, case_sensitive),
            PathSpec::Pattern(re) => Ok(Matcher {
                kind: MatcherKind::Compiled {
                    regex: re.clone(),
                    groups: pattern_groups(re),
                },
            }),
        }
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> Vec<&str> {
        match &self.kind {
            MatcherKind::Everything => Vec::new(),
            MatcherKind::Compiled { groups, .. } => groups.iter().map(|(_, n)| n.as_ref()).collect(),
        }
    }

    /// Test `path`, returning the captured parameters on a match.
    ///
    /// Values are percent-decoded; a value that does not decode is kept verbatim.
    /// Optional parameters that did not participate in the match are omitted.
    pub fn matches(&self, path: &str) -> Option<ParamVec> {
        match &self.kind {
            MatcherKind::Everything => Some(ParamVec::new()),
            MatcherKind::Compiled { regex, groups } => {
                let caps = regex.captures(path)?;
                let mut params = ParamVec::new();
                for (index, name) in groups {
                    if let Some(m) = caps.get(*index) {
                        params.push((Arc::clone(name), decode_segment(m.as_str())));
                    }
                }
                Some(params)
            }
        }
    }

    pub fn is_match(&self, path: &str) -> bool {
        match &self.kind {
            MatcherKind::Everything => true,
            MatcherKind::Compiled { regex, .. } => regex.is_match(path),
        }
    }
}

fn decode_segment(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

fn pattern_groups(re: &Regex) -> Vec<(usize, Arc<str>)> {
    let mut unnamed = 0usize;
    re.capture_names()
        .enumerate()
        .skip(1)
        .map(|(index, name)| {
            let name: Arc<str> = match name {
                Some(n) => Arc::from(n),
                None => {
                    let n = Arc::from(unnamed.to_string().as_str());
                    unnamed += 1;
                    n
                }
            };
            (index, name)
        })
        .collect()
}

fn compile_template(template: &str, case_sensitive: bool) -> Result<Matcher, RouteError> {
    let malformed = |reason: &'static str| RouteError::MalformedTemplate {
        path: template.to_string(),
        reason,
    };

    let body = if template.len() > 1 {
        template.strip_suffix('/').unwrap_or(template)
    } else {
        template
    };

    let mut pattern = String::with_capacity(template.len() * 2 + 8);
    if !case_sensitive {
        pattern.push_str("(?i)");
    }
    pattern.push('^');

    let mut names: Vec<Arc<str>> = Vec::new();
    let chars: Vec<char> = body.chars().collect();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ':' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                if end == start {
                    return Err(malformed("parameter name expected after ':'"));
                }
                let name: String = chars[start..end].iter().collect();
                i = end;

                let mut expr = String::from("[^/]+?");
                if i < chars.len() && chars[i] == '(' {
                    let (custom, after) = balanced_group(&chars, i)
                        .ok_or_else(|| malformed("unbalanced parentheses in parameter pattern"))?;
                    expr = custom;
                    i = after;
                }

                if i < chars.len() && matches!(chars[i], '+' | '*') {
                    return Err(malformed("repeat modifiers '+' and '*' on parameters are not supported"));
                }

                let optional = i < chars.len() && chars[i] == '?';
                if optional {
                    i += 1;
                }

                let prefixed = literal.ends_with('/');
                if optional && prefixed {
                    literal.pop();
                }
                pattern.push_str(&regex::escape(&literal));
                literal.clear();

                let group = format!("(?P<p{}>{})", names.len(), expr);
                if optional && prefixed {
                    pattern.push_str("(?:/");
                    pattern.push_str(&group);
                    pattern.push_str(")?");
                } else if optional {
                    pattern.push_str(&group);
                    pattern.push('?');
                } else {
                    pattern.push_str(&group);
                }
                names.push(Arc::from(name.as_str()));
            }
            '(' => return Err(malformed("unnamed groups are not supported, name the parameter")),
            '*' => {
                pattern.push_str(&regex::escape(&literal));
                literal.clear();
                pattern.push_str(".*");
                i += 1;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    let tail = literal.strip_suffix('/').unwrap_or(&literal);
    pattern.push_str(&regex::escape(tail));
    pattern.push_str("/?$");

    let regex = Regex::new(&pattern).map_err(|source| RouteError::InvalidPattern {
        path: template.to_string(),
        source,
    })?;

    let groups = names
        .into_iter()
        .enumerate()
        .filter_map(|(n, name)| {
            let group = format!("p{n}");
            regex
                .capture_names()
                .position(|c| c == Some(group.as_str()))
                .map(|index| (index, name))
        })
        .collect();

    Ok(Matcher {
        kind: MatcherKind::Compiled { regex, groups },
    })
}

/// Read a parenthesized expression starting at `open`; returns its inner text
/// and the index just past the closing parenthesis.
fn balanced_group(chars: &[char], open: usize) -> Option<(String, usize)> {
    let mut depth = 0usize;
    let mut i = open;
    let mut escaped = false;
    while i < chars.len() {
        let c = chars[i];
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '(' {
            depth += 1;
        } else if c == ')' {
            depth -= 1;
            if depth == 0 {
                let inner: String = chars[open + 1..i].iter().collect();
                return Some((inner, i + 1));
            }
        }
        i += 1;
    }
    None
}
