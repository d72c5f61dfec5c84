// src/semver.rs

//! Semantic Versioning 2.0.0 values, as specified at <https://semver.org>,
//! extended with the two comparison relations this system needs:
//!
//! - `strict`: precedence per the semver 2.0.0 spec, build metadata ignored.
//! - `metadata`: `strict`, refined by a final build-metadata tiebreak. This
//!   is the comparator [`SemVer`]'s `Ord` impl uses, since scripts are keyed
//!   on `X.Y.Z+script.N` and the build metadata carries the information that
//!   actually distinguishes one script from the next at the same X.Y.Z.
//!
//! Versions of the form `X.Y.Z+script.N` (exactly two build-metadata
//! identifiers, `"script"` and a non-negative integer) are *script
//! versions*; anything else is a *non-script version*, used only in
//! queries against a [`crate::script_dir::ScriptDir`].

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A single dot-separated identifier within a pre-release or build-metadata
/// list.
///
/// The original string is retained (not just the numeric value) so that
/// round-tripping a parsed version through [`SemVer::to_str`] is faithful,
/// including build-metadata identifiers that carry leading zeroes.
#[derive(Debug, Clone, Eq)]
pub struct Identifier {
    raw: String,
    numeric: Option<u64>,
}

impl Identifier {
    fn numeric(n: u64) -> Self {
        Identifier {
            raw: n.to_string(),
            numeric: Some(n),
        }
    }

    fn is_numeric(&self) -> bool {
        self.numeric.is_some()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

fn parse_identifier(part: &str, source: &str, allow_leading_zero: bool) -> Result<Identifier> {
    if part.is_empty() {
        return Err(Error::Parse(format!(
            "Dot-separated identifier parts must not be empty - got: {source}"
        )));
    }
    let mut is_numeric = true;
    for c in part.chars() {
        if !(c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::Parse(format!(
                "Dot-separated identifier parts must comprise only ASCII alphanumerics and \
                 hyphen - got: {source}"
            )));
        }
        if !c.is_ascii_digit() {
            is_numeric = false;
        }
    }
    if is_numeric {
        if !allow_leading_zero && part.len() > 1 && part.starts_with('0') {
            return Err(Error::Parse(format!(
                "Dot-separated numeric identifier parts must not include leading zeroes - got: \
                 {source}"
            )));
        }
        let n: u64 = part
            .parse()
            .map_err(|_| Error::Parse(format!("Numeric identifier out of range: {part}")))?;
        Ok(Identifier {
            raw: part.to_string(),
            numeric: Some(n),
        })
    } else {
        Ok(Identifier {
            raw: part.to_string(),
            numeric: None,
        })
    }
}

fn parse_identifier_list(s: &str, source: &str, allow_leading_zero: bool) -> Result<Vec<Identifier>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    if s.ends_with('.') {
        return Err(Error::Parse(format!(
            "Dot-separated identifier parts must not be empty - got: {source}"
        )));
    }
    s.split('.')
        .map(|part| parse_identifier(part, source, allow_leading_zero))
        .collect()
}

/// Compares two equal-length-prefix identifier lists element by element.
/// Numeric identifiers compare numerically; numeric identifiers always have
/// lower precedence than alphanumeric ones; a shorter list has lower
/// precedence than a longer one that shares its prefix.
fn compare_identifier_elements(a: &[Identifier], b: &[Identifier]) -> Ordering {
    for (ai, bi) in a.iter().zip(b.iter()) {
        match (ai.is_numeric(), bi.is_numeric()) {
            (true, true) => match ai.numeric.cmp(&bi.numeric) {
                Ordering::Equal => continue,
                other => return other,
            },
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {
                if ai.raw == bi.raw {
                    continue;
                }
                return ai.raw.cmp(&bi.raw);
            }
        }
    }
    a.len().cmp(&b.len())
}

/// Pre-release ordering: an absent list has *higher* precedence than a
/// present, non-empty one (`1.0.0` outranks `1.0.0-alpha`), per semver 2.0.
fn compare_prerelease(a: &[Identifier], b: &[Identifier]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => Ordering::Equal,
        (false, false) => compare_identifier_elements(a, b),
    }
}

/// Build-metadata ordering used as the final tiebreak in [`SemVer`]'s
/// default ordering. Unlike pre-release, an absent build-metadata list
/// sorts *below* a present one.
fn compare_build_metadata(a: &[Identifier], b: &[Identifier]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (true, true) => Ordering::Equal,
        (false, false) => compare_identifier_elements(a, b),
    }
}

/// Normalises a `["script", N]` build-metadata pair to `N`'s canonical
/// (leading-zero-free) form, matching what [`SemVer::script_version`]
/// constructs directly. Without this, `SemVer::parse("1.0.0+script.0057")`
/// and `SemVer::script_version(1, 0, 0, 57)` would be `Ord`-equal (numeric
/// comparison) but `PartialEq`-unequal (raw-string comparison) - spec §4.1
/// requires the former to be the only behaviour.
fn canonicalize_script_build_metadata(build_metadata: &mut [Identifier]) {
    if build_metadata.len() >= 2
        && !build_metadata[0].is_numeric()
        && build_metadata[0].raw == "script"
        && build_metadata[1].is_numeric()
    {
        if let Some(n) = build_metadata[1].numeric {
            build_metadata[1] = Identifier::numeric(n);
        }
    }
}

fn parse_numeric_part(part: &str, source: &str) -> Result<u64> {
    if part.is_empty() {
        return Err(Error::Parse(format!(
            "Version part must not be empty - got: {source}"
        )));
    }
    if part.len() != 1 && part.starts_with('0') {
        return Err(Error::Parse(format!(
            "Version part must not contain leading zeroes - got: {part}"
        )));
    }
    if !part.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Parse(format!(
            "Version part must be a non-negative integer - got: {part}"
        )));
    }
    part.parse()
        .map_err(|_| Error::Parse(format!("Version part out of range: {part}")))
}

/// A parsed, immutable semantic version.
///
/// `major`/`minor`/`patch` render without leading zeroes. `pre_release` and
/// `build_metadata` are ordered lists of dot-separated identifiers.
#[derive(Debug, Clone)]
pub struct SemVer {
    major: u64,
    minor: u64,
    patch: u64,
    pre_release: Vec<Identifier>,
    build_metadata: Vec<Identifier>,
}

impl SemVer {
    /// Construct directly from numeric major/minor/patch with no pre-release
    /// or build metadata.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        SemVer {
            major,
            minor,
            patch,
            pre_release: Vec::new(),
            build_metadata: Vec::new(),
        }
    }

    /// A semantic version representing zero, i.e. no version installed.
    pub fn zero() -> Self {
        SemVer::new(0, 0, 0)
    }

    /// `1.0.0`, the version that defines the initial public API.
    pub fn initial_public_api() -> Self {
        SemVer::new(1, 0, 0)
    }

    /// Build a script version `major.minor.patch+script.N`.
    pub fn script_version(major: u64, minor: u64, patch: u64, script_number: u64) -> Self {
        SemVer {
            major,
            minor,
            patch,
            pre_release: Vec::new(),
            build_metadata: vec![
                Identifier {
                    raw: "script".to_string(),
                    numeric: None,
                },
                Identifier::numeric(script_number),
            ],
        }
    }

    pub fn major(&self) -> u64 {
        self.major
    }
    pub fn minor(&self) -> u64 {
        self.minor
    }
    pub fn patch(&self) -> u64 {
        self.patch
    }
    pub fn pre_release_ids(&self) -> &[Identifier] {
        &self.pre_release
    }
    pub fn build_metadata_ids(&self) -> &[Identifier] {
        &self.build_metadata
    }

    /// Parse `MAJOR.MINOR.PATCH[-prerelease][+buildmetadata]`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::Parse("Input string cannot be empty".to_string()));
        }

        let mut dots = s.splitn(3, '.');
        let major_str = dots.next().unwrap();
        let minor_str = dots.next().ok_or_else(|| {
            Error::Parse(format!(
                "No second dot '.' found in input string - a normal version number MUST take \
                 the form X.Y.Z: {s}"
            ))
        })?;
        let rest = dots.next().ok_or_else(|| {
            Error::Parse(format!(
                "No dots '.' found in input string - a normal version number MUST take the form \
                 X.Y.Z: {s}"
            ))
        })?;

        let major = parse_numeric_part(major_str, s)?;
        let minor = parse_numeric_part(minor_str, s)?;

        // Split off build metadata first (identifiers can't contain '+'),
        // then split the remainder on the first '-' to find pre-release.
        let (patch_and_pre, bm_str) = match rest.find('+') {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };
        if let Some(bm) = bm_str {
            if bm.is_empty() {
                return Err(Error::Parse(format!(
                    "If build metadata is indicated with a plus sign, it cannot be empty: {s}"
                )));
            }
        }

        let (patch_str, pr_str) = match patch_and_pre.find('-') {
            Some(pos) => (&patch_and_pre[..pos], Some(&patch_and_pre[pos + 1..])),
            None => (patch_and_pre, None),
        };
        if let Some(pr) = pr_str {
            if pr.is_empty() {
                return Err(Error::Parse(format!(
                    "If a pre-release is indicated with a hyphen, it cannot be empty: {s}"
                )));
            }
        }

        let patch = parse_numeric_part(patch_str, s)?;
        let pre_release = parse_identifier_list(pr_str.unwrap_or(""), s, false)?;
        let mut build_metadata = parse_identifier_list(bm_str.unwrap_or(""), s, true)?;
        canonicalize_script_build_metadata(&mut build_metadata);

        Ok(SemVer {
            major,
            minor,
            patch,
            pre_release,
            build_metadata,
        })
    }

    /// Render the canonical string form.
    pub fn to_str(&self) -> String {
        self.to_string()
    }

    fn prerelease_str(&self) -> String {
        join_identifiers(&self.pre_release)
    }

    fn build_metadata_str(&self) -> String {
        join_identifiers(&self.build_metadata)
    }

    /// Whether this is a *script version*: build metadata is exactly
    /// `["script", N]` with `N` numeric.
    pub fn is_script_version(&self) -> bool {
        self.script_number().is_some()
    }

    /// The script number, if this is a script version.
    pub fn script_number(&self) -> Option<u64> {
        if self.build_metadata.len() >= 2
            && !self.build_metadata[0].is_numeric()
            && self.build_metadata[0].raw == "script"
            && self.build_metadata[1].is_numeric()
        {
            self.build_metadata[1].numeric
        } else {
            None
        }
    }

    /// Increment to the next major version, zeroing minor/patch and clearing
    /// pre-release. Build metadata is cleared unless `preserve_build_metadata`.
    pub fn next_major(&self, preserve_build_metadata: bool) -> Self {
        SemVer {
            major: self.major + 1,
            minor: 0,
            patch: 0,
            pre_release: Vec::new(),
            build_metadata: if preserve_build_metadata {
                self.build_metadata.clone()
            } else {
                Vec::new()
            },
        }
    }

    /// Increment to the next minor version, zeroing patch and clearing
    /// pre-release. Build metadata is cleared unless `preserve_build_metadata`.
    pub fn next_minor(&self, preserve_build_metadata: bool) -> Self {
        SemVer {
            major: self.major,
            minor: self.minor + 1,
            patch: 0,
            pre_release: Vec::new(),
            build_metadata: if preserve_build_metadata {
                self.build_metadata.clone()
            } else {
                Vec::new()
            },
        }
    }

    /// Increment to the next patch version, clearing pre-release. Build
    /// metadata is cleared unless `preserve_build_metadata`.
    pub fn next_patch(&self, preserve_build_metadata: bool) -> Self {
        SemVer {
            major: self.major,
            minor: self.minor,
            patch: self.patch + 1,
            pre_release: Vec::new(),
            build_metadata: if preserve_build_metadata {
                self.build_metadata.clone()
            } else {
                Vec::new()
            },
        }
    }

    /// Major version zero (0.y.z) is for initial development.
    pub fn is_initial_development(&self) -> bool {
        self.major == 0
    }

    /// Whether this version is `0.0.0`.
    pub fn is_zero(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.patch == 0
    }

    /// Precedence per semver 2.0.0 clause 11, ignoring build metadata.
    pub fn cmp_strict(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| compare_prerelease(&self.pre_release, &other.pre_release))
    }

    /// `cmp_strict`, refined by a build-metadata tiebreak. This is the
    /// default ordering ([`Ord`]) for [`SemVer`].
    pub fn cmp_metadata(&self, other: &Self) -> Ordering {
        self.cmp_strict(other)
            .then_with(|| compare_build_metadata(&self.build_metadata, &other.build_metadata))
    }
}

fn join_identifiers(ids: &[Identifier]) -> String {
    ids.iter()
        .map(|i| i.raw.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.prerelease_str())?;
        }
        if !self.build_metadata.is_empty() {
            write!(f, "+{}", self.build_metadata_str())?;
        }
        Ok(())
    }
}

impl FromStr for SemVer {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        SemVer::parse(s)
    }
}

impl PartialEq for SemVer {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major
            && self.minor == other.minor
            && self.patch == other.patch
            && self.pre_release == other.pre_release
            && self.build_metadata == other.build_metadata
    }
}
impl Eq for SemVer {}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_metadata(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_well_formed_versions() {
        for s in [
            "1.2.3",
            "4.5.6-rc123",
            "7.8.9+wibble578374",
            "6.0.2-alpha.1+build3927.whatever",
            "0.0.0",
            "1.0.0+script.57",
        ] {
            let v = SemVer::parse(s).unwrap();
            assert_eq!(v.to_str(), s);
            let v2 = SemVer::parse(&v.to_str()).unwrap();
            assert_eq!(v, v2);
        }
    }

    #[test]
    fn zero_renders_canonically() {
        assert_eq!(SemVer::zero().to_str(), "0.0.0");
    }

    #[test]
    fn rejects_leading_zeroes_and_bad_identifiers() {
        assert!(SemVer::parse("01.1.1").is_err());
        assert!(SemVer::parse("1.2.3-foo?").is_err());
        assert!(SemVer::parse("").is_err());
        assert!(SemVer::parse("1.2").is_err());
        assert!(SemVer::parse("1").is_err());
    }

    #[test]
    fn script_build_metadata_normalises_leading_zeroes() {
        let v = SemVer::script_version(2, 44, 2, 57);
        assert_eq!(v.to_str(), "2.44.2+script.57");
        assert_eq!(v.script_number(), Some(57));
    }

    #[test]
    fn parse_canonicalises_padded_script_number_to_match_script_version() {
        // Build metadata numeric identifiers may carry leading zeroes (e.g.
        // copy-pasted from a filename like `upgrade/1.0.0+script.0057_x.sql`).
        // `parse` must canonicalise the `script.N` pair the same way
        // `script_version` constructs it directly, so both paths produce
        // values that are equal under PartialEq (not just Ord).
        let parsed = SemVer::parse("1.0.0+script.0057").unwrap();
        let built = SemVer::script_version(1, 0, 0, 57);
        assert_eq!(parsed, built);
        assert_eq!(parsed.to_str(), "1.0.0+script.57");
        assert_eq!(parsed.cmp_metadata(&built), Ordering::Equal);
    }

    #[test]
    fn strict_ignores_build_metadata() {
        let a = SemVer::parse("1.2.3+foo").unwrap();
        let b = SemVer::parse("1.2.3+bar").unwrap();
        assert_eq!(a.cmp_strict(&b), Ordering::Equal);
        assert_ne!(a, b);
    }

    #[test]
    fn metadata_breaks_ties_on_build_metadata() {
        let a = SemVer::parse("1.2.3+script.1").unwrap();
        let b = SemVer::parse("1.2.3+script.2").unwrap();
        assert!(a < b);

        let bare = SemVer::parse("1.2.3").unwrap();
        let scripted = SemVer::parse("1.2.3+script.1").unwrap();
        // absent build metadata sorts below a present one
        assert!(bare < scripted);
    }

    #[test]
    fn prerelease_outranked_by_normal_version() {
        let pre = SemVer::parse("1.0.0-alpha").unwrap();
        let normal = SemVer::parse("1.0.0").unwrap();
        assert!(pre < normal);
    }

    #[test]
    fn prerelease_ordering_matches_semver_example_chain() {
        let chain = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
        ];
        let versions: Vec<SemVer> = chain.iter().map(|s| SemVer::parse(s).unwrap()).collect();
        for w in versions.windows(2) {
            assert!(w[0] < w[1], "{} should be < {}", w[0], w[1]);
        }
    }

    #[test]
    fn next_increments_reset_lower_parts() {
        let v = SemVer::parse("1.2.3-pre+script.4").unwrap();
        assert_eq!(v.next_patch(false).to_str(), "1.2.4");
        assert_eq!(v.next_minor(false).to_str(), "1.3.0");
        assert_eq!(v.next_major(false).to_str(), "2.0.0");
        assert_eq!(v.next_patch(true).to_str(), "1.2.4+script.4");
    }

    #[test]
    fn is_zero_and_is_initial_development() {
        assert!(SemVer::zero().is_zero());
        assert!(!SemVer::initial_public_api().is_zero());
        assert!(SemVer::parse("0.3.0").unwrap().is_initial_development());
        assert!(!SemVer::parse("1.0.0").unwrap().is_initial_development());
    }
}
