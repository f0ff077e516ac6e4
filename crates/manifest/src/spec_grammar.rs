//! The project-spec argument grammar used by `add`/`update`:
//! `<path>[:<alternate-source>][@<constraint>]`.

use nom::bytes::complete::{tag, take_till};
use nom::combinator::{opt, rest};
use nom::sequence::preceded;
use nom::{IResult, Parser};
use thiserror::Error;
use version::{Constraint, RevisionId, Version};

use crate::Source;

/// A parsed project-spec argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSpec {
    /// The import path naming the project (not yet reduced to a root).
    pub path: String,
    /// An alternate source to fetch it from, if given.
    pub source: Option<Source>,
    /// The constraint inferred from the trailing `@...`, if given.
    pub constraint: Option<Constraint>,
}

/// An error parsing a project-spec argument.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The argument was empty or had an empty path component.
    #[error("project spec `{0}` has no path")]
    EmptyPath(String),
    /// The alternate source did not parse as a URL.
    #[error("project spec `{spec}` has an invalid alternate source: {source}")]
    InvalidSource {
        /// The whole spec string, for diagnostics.
        spec: String,
        /// The underlying URL parse error.
        source: url::ParseError,
    },
}

/// Parses one project-spec argument.
pub fn parse(input: &str) -> Result<ProjectSpec, Error> {
    let (_, (path, source, constraint_text)) =
        grammar(input).expect("take_till/opt never fail");

    if path.is_empty() {
        return Err(Error::EmptyPath(input.to_string()));
    }

    let source = source
        .map(Source::parse)
        .transpose()
        .map_err(|source| Error::InvalidSource {
            spec: input.to_string(),
            source,
        })?;

    let constraint = constraint_text.map(classify_constraint);

    Ok(ProjectSpec {
        path: path.to_string(),
        source,
        constraint,
    })
}

fn grammar(input: &str) -> IResult<&str, (&str, Option<&str>, Option<&str>)> {
    let (input, path) = take_till(|c| c == ':' || c == '@')(input)?;
    let (input, source) = opt(preceded(tag(":"), take_till(|c: char| c == '@'))).parse(input)?;
    let (input, constraint) = opt(preceded(tag("@"), rest)).parse(input)?;
    Ok((input, (path, source, constraint)))
}

/// Infers a [`Constraint`] variant from raw constraint text: a 40-hex
/// string is a revision, anything that parses as a semver range is a
/// range, otherwise it is a literal tag.
fn classify_constraint(text: &str) -> Constraint {
    if version::looks_like_forty_hex(text) {
        if let Ok(rev) = RevisionId::new(text.to_string()) {
            return Constraint::Version(Version::Revision(rev));
        }
    }
    if let Ok(req) = semver::VersionReq::parse(text) {
        return Constraint::SemverRange(req);
    }
    Constraint::Version(Version::Tag(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_path_has_no_source_or_constraint() {
        let spec = parse("github.com/foo/bar").unwrap();
        assert_eq!(spec.path, "github.com/foo/bar");
        assert!(spec.source.is_none());
        assert!(spec.constraint.is_none());
    }

    #[test]
    fn path_with_constraint_infers_range() {
        let spec = parse("github.com/foo/bar@^1.0.0").unwrap();
        assert_eq!(
            spec.constraint,
            Some(Constraint::SemverRange(semver::VersionReq::parse("^1.0.0").unwrap()))
        );
    }

    #[test]
    fn path_with_revision_constraint() {
        let rev = "a".repeat(40);
        let spec = parse(&format!("github.com/foo/bar@{rev}")).unwrap();
        assert_eq!(
            spec.constraint,
            Some(Constraint::Version(Version::Revision(RevisionId::new(rev).unwrap())))
        );
    }

    #[test]
    fn path_with_literal_tag_constraint() {
        let spec = parse("github.com/foo/bar@some-branch-name").unwrap();
        assert_eq!(
            spec.constraint,
            Some(Constraint::Version(Version::Tag("some-branch-name".into())))
        );
    }

    #[test]
    fn path_with_alternate_source_and_constraint() {
        let spec = parse("github.com/foo/bar:https://example.com/fork.git@v1.0.0").unwrap();
        assert_eq!(spec.path, "github.com/foo/bar");
        assert_eq!(spec.source.unwrap().url().as_str(), "https://example.com/fork.git");
        assert_eq!(
            spec.constraint,
            Some(Constraint::Version(Version::Tag("v1.0.0".into())))
        );
    }

    #[test]
    fn empty_path_is_rejected() {
        assert_eq!(parse("@v1.0.0"), Err(Error::EmptyPath("@v1.0.0".to_string())));
    }
}
