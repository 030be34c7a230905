//! Include resolution and multi-file composition.
//!
//! `#include "path"` lines are extracted before lexing, resolved relative to
//! the including file's directory, and composed depth-first. The mode per
//! file is decided by its direct includes: if exactly one include carries an
//! `architecture` block the file extends it (inheritance, overrides
//! allowed); if none do, partial includes merge into the file's own
//! architecture under a global-uniqueness rule; a file without an
//! architecture block of its own aggregates partials and stays a partial.

use std::fs;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use sha2::{Digest, Sha256};

use crate::error::{IsaError, IsaResult};
use crate::loader::parser::{ParsedUnit, parse_str};
use crate::spec::IsaSpecification;

/// One fully resolved file: its own definitions with every include already
/// folded in, plus the file that first defined each named entity.
#[derive(Debug, Clone)]
struct ComposedUnit {
    spec: IsaSpecification,
    has_architecture: bool,
    origins: AHashMap<(&'static str, String), PathBuf>,
}

#[derive(Default)]
pub struct IsaComposer {
    stack: Vec<PathBuf>,
    resolved: AHashMap<PathBuf, ComposedUnit>,
    sources: Vec<(PathBuf, String)>,
}

impl IsaComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composes the include tree rooted at `entry` into one specification.
    /// State from earlier calls is discarded; the per-call cache only serves
    /// diamond-shaped include graphs within one tree.
    pub fn compose<P: AsRef<Path>>(&mut self, entry: P) -> IsaResult<IsaSpecification> {
        self.stack.clear();
        self.resolved.clear();
        self.sources.clear();
        Ok(self.resolve(entry.as_ref())?.spec)
    }

    /// Source text of every file the last `compose` read, in first-visit
    /// order (a file shared by several includes appears once).
    pub fn sources(&self) -> &[(PathBuf, String)] {
        &self.sources
    }

    /// Hex SHA-256 digest over the composed source text, for artifact
    /// staleness checks. Stable as long as no visited file changes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (_, text) in &self.sources {
            hasher.update(text.as_bytes());
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect()
    }

    fn resolve(&mut self, path: &Path) -> Result<ComposedUnit, IsaError> {
        if self.stack.iter().any(|seen| seen == path) {
            let mut chain = self.stack.clone();
            chain.push(path.to_path_buf());
            return Err(IsaError::CircularDependency { chain });
        }
        if let Some(unit) = self.resolved.get(path) {
            return Ok(unit.clone());
        }

        let source = read_source(path)?;
        let (clean, include_paths) = extract_includes(path, &source)?;
        self.sources.push((path.to_path_buf(), source));
        let parsed = parse_str(path.to_path_buf(), &clean)?;

        self.stack.push(path.to_path_buf());
        let mut includes = Vec::new();
        for raw in &include_paths {
            let target = resolve_include_path(path, raw);
            let unit = self.resolve(&target)?;
            includes.push((target, unit));
        }
        self.stack.pop();

        let unit = compose_unit(path, parsed, includes)?;
        self.resolved.insert(path.to_path_buf(), unit.clone());
        Ok(unit)
    }
}

/// One-shot composition of the include tree rooted at `entry`.
pub fn compose_file<P: AsRef<Path>>(entry: P) -> IsaResult<IsaSpecification> {
    IsaComposer::new().compose(entry)
}

fn compose_unit(
    path: &Path,
    parsed: ParsedUnit,
    includes: Vec<(PathBuf, ComposedUnit)>,
) -> Result<ComposedUnit, IsaError> {
    let mut base: Option<(PathBuf, ComposedUnit)> = None;
    let mut extra_bases: Vec<PathBuf> = Vec::new();
    let mut partials: Vec<(PathBuf, ComposedUnit)> = Vec::new();
    for (inc_path, unit) in includes {
        if unit.has_architecture {
            if base.is_none() {
                base = Some((inc_path, unit));
            } else {
                extra_bases.push(inc_path);
            }
        } else {
            partials.push((inc_path, unit));
        }
    }

    if !extra_bases.is_empty() {
        let (first_base, _) = base.as_ref().expect("extra base implies a first base");
        if parsed.has_architecture {
            let mut bases = vec![first_base.clone()];
            bases.extend(extra_bases);
            return Err(IsaError::MultipleInheritance {
                path: path.to_path_buf(),
                bases,
            });
        }
        return Err(IsaError::PartialDefinitionRequired {
            path: path.to_path_buf(),
            offender: extra_bases.remove(0),
        });
    }

    match (parsed.has_architecture, base) {
        // extending file: base first, sibling partials next, own
        // definitions last, same-name entities overriding in place
        (true, Some((_, base_unit))) => {
            let mut unit = base_unit;
            for (_, partial) in partials {
                absorb_unit(&mut unit, partial);
            }
            let own = leaf_unit(path, parsed.spec, true);
            let name = own.spec.name.clone();
            let source_path = own.spec.source_path.clone();
            absorb_unit(&mut unit, own);
            unit.spec.name = name;
            unit.spec.source_path = source_path;
            unit.has_architecture = true;
            Ok(unit)
        }
        (false, Some((base_path, _))) => Err(IsaError::ArchitectureExtensionRequired {
            path: path.to_path_buf(),
            base: base_path,
        }),
        // merge mode: every name may be defined by exactly one file
        (true, None) => {
            let mut unit = leaf_unit(path, parsed.spec, true);
            for (_, partial) in partials {
                check_duplicates(&unit, &partial)?;
                absorb_unit(&mut unit, partial);
            }
            Ok(unit)
        }
        // partial aggregate: stays a partial, uniqueness checked by
        // whichever architecture file eventually includes it
        (false, None) => {
            let mut unit = leaf_unit(path, parsed.spec, false);
            for (_, partial) in partials {
                absorb_unit(&mut unit, partial);
            }
            Ok(unit)
        }
    }
}

fn leaf_unit(path: &Path, spec: IsaSpecification, has_architecture: bool) -> ComposedUnit {
    let mut origins = AHashMap::new();
    for (kind, name) in spec.named_entities() {
        origins.insert((kind, name.to_string()), path.to_path_buf());
    }
    ComposedUnit {
        spec,
        has_architecture,
        origins,
    }
}

fn absorb_unit(target: &mut ComposedUnit, incoming: ComposedUnit) {
    target.origins.extend(incoming.origins);
    target.spec.absorb(incoming.spec);
}

/// Rejects any entity already defined by a different file. The same entity
/// arriving twice from one file is a diamond include, not a conflict.
fn check_duplicates(target: &ComposedUnit, incoming: &ComposedUnit) -> Result<(), IsaError> {
    for (kind, name) in incoming.spec.named_entities() {
        let key = (kind, name.to_string());
        let Some(first) = target.origins.get(&key) else {
            continue;
        };
        let Some(second) = incoming.origins.get(&key) else {
            continue;
        };
        if first != second {
            return Err(IsaError::DuplicateDefinition {
                kind,
                name: name.to_string(),
                first: first.clone(),
                second: second.clone(),
            });
        }
    }
    Ok(())
}

fn read_source(path: &Path) -> Result<String, IsaError> {
    fs::read_to_string(path).map_err(|err| {
        IsaError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", path.display()),
        ))
    })
}

/// Splits a file into its `#include` targets and the remaining source text.
/// Include lines are replaced by blank lines so diagnostic line numbers
/// still refer to the original file.
fn extract_includes(path: &Path, source: &str) -> Result<(String, Vec<String>), IsaError> {
    let mut clean = String::with_capacity(source.len());
    let mut includes = Vec::new();
    let mut in_block_comment = false;

    for (index, line) in source.lines().enumerate() {
        let (visible, next_block_state) = visible_text(line, in_block_comment);
        let code = visible.trim();
        if !in_block_comment {
            if let Some(rest) = code.strip_prefix("#include") {
                let target = parse_include_path(rest).ok_or_else(|| {
                    IsaError::Parser(format!(
                        "malformed #include directive in {}, line {}: expected a quoted path",
                        path.display(),
                        index + 1
                    ))
                })?;
                includes.push(target);
                in_block_comment = next_block_state;
                clean.push('\n');
                continue;
            }
            if code.starts_with('#') {
                return Err(IsaError::Parser(format!(
                    "unknown directive in {}, line {}: only #include is supported",
                    path.display(),
                    index + 1
                )));
            }
        }
        in_block_comment = next_block_state;
        clean.push_str(line);
        clean.push('\n');
    }
    Ok((clean, includes))
}

/// Comment-free portion of one line, given whether the previous line ended
/// inside a `/* ... */` block. Also reports the block state after the line.
fn visible_text(line: &str, mut in_block: bool) -> (String, bool) {
    let mut visible = String::new();
    let mut in_string = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_block {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            }
            continue;
        }
        if in_string {
            visible.push(ch);
            if ch == '\\' {
                if let Some(escaped) = chars.next() {
                    visible.push(escaped);
                }
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                visible.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => break,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block = true;
            }
            _ => visible.push(ch),
        }
    }
    (visible, in_block)
}

/// Quoted path after the `#include` keyword. The rest of the line may hold
/// only whitespace or a comment.
fn parse_include_path(rest: &str) -> Option<String> {
    let rest = rest.trim_start();
    let mut chars = rest.chars();
    let quote = chars.next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let body = chars.as_str();
    let end = body.find(quote)?;
    let target = &body[..end];
    let trailer = body[end + 1..].trim();
    let trailer_ok = trailer.is_empty()
        || trailer.starts_with("//")
        || (trailer.starts_with("/*") && trailer.ends_with("*/"));
    if target.is_empty() || !trailer_ok {
        return None;
    }
    Some(target.to_string())
}

fn resolve_include_path(parent: &Path, include: &str) -> PathBuf {
    let include = Path::new(include);
    if include.is_absolute() {
        include.to_path_buf()
    } else {
        parent
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(include)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    #[test]
    fn merges_partial_definitions_into_the_architecture() {
        let dir = tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "registers.isa",
            "registers { sfr PC 32 sfr SP 32 }",
        );
        write_file(
            dir.path(),
            "formats.isa",
            "formats { format IMM_TYPE 32 { opcode: [0:5] imm: [6:31] } }",
        );
        let main = write_file(
            dir.path(),
            "main.isa",
            "#include \"registers.isa\"\n\
             #include \"formats.isa\"\n\
             architecture TestISA {\n\
                 word_size: 32\n\
                 registers { gpr R 32 [16] }\n\
                 formats { format R_TYPE 32 { opcode: [0:5] } }\n\
             }\n",
        );

        let isa = compose_file(&main).expect("compose");
        assert_eq!(isa.name, "TestISA");
        assert_eq!(isa.registers.len(), 3);
        assert!(isa.get_register("R").is_some());
        assert!(isa.get_register("PC").is_some());
        assert!(isa.get_register("SP").is_some());
        assert_eq!(isa.formats.len(), 2);
        assert!(isa.get_format("R_TYPE").is_some());
        assert!(isa.get_format("IMM_TYPE").is_some());
    }

    #[test]
    fn inheritance_overrides_in_place_and_appends() {
        let dir = tempdir().expect("tempdir");
        let base = write_file(
            dir.path(),
            "base.isa",
            "architecture BaseISA {\n\
                 word_size: 32\n\
                 endianness: \"little\"\n\
                 registers { gpr R 32 [16] sfr PC 32 }\n\
             }\n",
        );
        let extended = write_file(
            dir.path(),
            "extended.isa",
            &format!(
                "#include \"{}\"\n\
                 architecture ExtendedISA {{\n\
                     word_size: 64\n\
                     registers {{ gpr R 64 [32] sfr SP 32 }}\n\
                 }}\n",
                base.file_name().and_then(|n| n.to_str()).expect("name")
            ),
        );

        let isa = compose_file(&extended).expect("compose");
        assert_eq!(isa.name, "ExtendedISA");
        assert_eq!(isa.word_size(), 64);
        assert_eq!(
            isa.property("endianness").and_then(|v| v.as_text()),
            Some("little")
        );
        assert_eq!(isa.registers.len(), 3);
        // override keeps the base's slot
        assert_eq!(isa.registers[0].name, "R");
        assert_eq!(isa.registers[0].width, 64);
        assert_eq!(isa.registers[0].count, Some(32));
        assert_eq!(isa.registers[1].name, "PC");
        assert_eq!(isa.registers[2].name, "SP");
    }

    #[test]
    fn inheritance_merges_sibling_partials() {
        let dir = tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "base.isa",
            "architecture BaseISA { registers { gpr R 32 [16] } }",
        );
        write_file(
            dir.path(),
            "extra.isa",
            "registers { sfr STATUS 32 sfr CONTROL 32 }",
        );
        let extended = write_file(
            dir.path(),
            "extended.isa",
            "#include \"base.isa\"\n\
             #include \"extra.isa\"\n\
             architecture ExtendedISA { registers { sfr SP 32 } }\n",
        );

        let isa = compose_file(&extended).expect("compose");
        assert_eq!(isa.registers.len(), 4);
        assert!(isa.get_register("R").is_some());
        assert!(isa.get_register("STATUS").is_some());
        assert!(isa.get_register("CONTROL").is_some());
        assert!(isa.get_register("SP").is_some());
    }

    #[test]
    fn detects_include_cycles() {
        let dir = tempdir().expect("tempdir");
        let a = write_file(dir.path(), "a.isa", "#include \"b.isa\"\n");
        write_file(dir.path(), "b.isa", "#include \"a.isa\"\n");

        let err = compose_file(&a).unwrap_err();
        match err {
            IsaError::CircularDependency { chain } => {
                assert_eq!(chain.len(), 3);
                assert_eq!(chain[0], a);
                assert_eq!(chain[2], a);
                assert!(chain[1].ends_with("b.isa"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_multiple_bases() {
        let dir = tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "base1.isa",
            "architecture BaseOne { registers { gpr A 32 } }",
        );
        write_file(
            dir.path(),
            "base2.isa",
            "architecture BaseTwo { registers { gpr B 32 } }",
        );
        let main = write_file(
            dir.path(),
            "main.isa",
            "#include \"base1.isa\"\n\
             #include \"base2.isa\"\n\
             architecture Combined { registers { gpr C 32 } }\n",
        );

        let err = compose_file(&main).unwrap_err();
        match err {
            IsaError::MultipleInheritance { path, bases } => {
                assert_eq!(path, main);
                assert_eq!(bases.len(), 2);
                assert!(bases[0].ends_with("base1.isa"));
                assert!(bases[1].ends_with("base2.isa"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extension_requires_own_architecture() {
        let dir = tempdir().expect("tempdir");
        write_file(
            dir.path(),
            "base.isa",
            "architecture BaseISA { registers { gpr R 32 [16] } }",
        );
        let main = write_file(
            dir.path(),
            "main.isa",
            "#include \"base.isa\"\nregisters { sfr SP 32 }\n",
        );

        let err = compose_file(&main).unwrap_err();
        match err {
            IsaError::ArchitectureExtensionRequired { path, base } => {
                assert_eq!(path, main);
                assert!(base.ends_with("base.isa"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn partials_may_not_include_two_architectures() {
        let dir = tempdir().expect("tempdir");
        write_file(dir.path(), "base1.isa", "architecture BaseOne { }");
        write_file(dir.path(), "base2.isa", "architecture BaseTwo { }");
        let main = write_file(
            dir.path(),
            "main.isa",
            "#include \"base1.isa\"\n#include \"base2.isa\"\n",
        );

        let err = compose_file(&main).unwrap_err();
        match err {
            IsaError::PartialDefinitionRequired { path, offender } => {
                assert_eq!(path, main);
                assert!(offender.ends_with("base2.isa"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_definitions_name_both_files() {
        let dir = tempdir().expect("tempdir");
        let partial = write_file(dir.path(), "regs.isa", "registers { gpr R 32 [16] }");
        let main = write_file(
            dir.path(),
            "main.isa",
            "#include \"regs.isa\"\n\
             architecture DupISA { registers { gpr R 32 [16] } }\n",
        );

        let err = compose_file(&main).unwrap_err();
        match err {
            IsaError::DuplicateDefinition {
                kind,
                name,
                first,
                second,
            } => {
                assert_eq!(kind, "register");
                assert_eq!(name, "R");
                assert_eq!(first, main);
                assert_eq!(second, partial);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn diamond_includes_are_not_duplicates() {
        let dir = tempdir().expect("tempdir");
        write_file(dir.path(), "common.isa", "registers { sfr STATUS 32 }");
        write_file(
            dir.path(),
            "left.isa",
            "#include \"common.isa\"\nregisters { gpr L 32 }\n",
        );
        write_file(
            dir.path(),
            "right.isa",
            "#include \"common.isa\"\nregisters { gpr Q 32 }\n",
        );
        let main = write_file(
            dir.path(),
            "main.isa",
            "#include \"left.isa\"\n\
             #include \"right.isa\"\n\
             architecture Diamond { registers { gpr R 32 [16] } }\n",
        );

        let isa = compose_file(&main).expect("diamond composes");
        assert_eq!(isa.registers.len(), 4);
        assert!(isa.get_register("STATUS").is_some());
    }

    #[test]
    fn includes_resolve_relative_to_the_including_file() {
        let dir = tempdir().expect("tempdir");
        write_file(dir.path(), "nested/more.isa", "registers { sfr DEEP 32 }");
        write_file(
            dir.path(),
            "nested/regs.isa",
            "#include \"more.isa\"\nregisters { gpr N 32 }\n",
        );
        let main = write_file(
            dir.path(),
            "main.isa",
            "#include \"nested/regs.isa\"\n\
             architecture Nested { registers { gpr R 32 [16] } }\n",
        );

        let isa = compose_file(&main).expect("compose");
        assert!(isa.get_register("DEEP").is_some());
        assert!(isa.get_register("N").is_some());
    }

    #[test]
    fn include_lines_inside_comments_are_ignored() {
        let dir = tempdir().expect("tempdir");
        let main = write_file(
            dir.path(),
            "main.isa",
            "// #include \"missing.isa\"\n\
             /*\n\
             #include \"also_missing.isa\"\n\
             */\n\
             architecture Commented { registers { gpr R 32 [16] } }\n",
        );

        let isa = compose_file(&main).expect("compose");
        assert_eq!(isa.name, "Commented");
    }

    #[test]
    fn malformed_include_is_reported() {
        let dir = tempdir().expect("tempdir");
        let main = write_file(dir.path(), "main.isa", "#include no_quotes.isa\n");

        let err = compose_file(&main).unwrap_err();
        assert!(matches!(
            err,
            IsaError::Parser(msg) if msg.contains("malformed #include")
        ));
    }

    #[test]
    fn a_bare_partial_composes_standalone() {
        let dir = tempdir().expect("tempdir");
        let main = write_file(
            dir.path(),
            "partial.isa",
            "registers { gpr R 32 [16] }\nformats { format F 32 { op: [0:5] } }\n",
        );

        let isa = compose_file(&main).expect("partials are legal roots");
        assert!(isa.name.is_empty());
        assert!(isa.get_register("R").is_some());
        assert!(isa.get_format("F").is_some());
    }

    #[test]
    fn fingerprint_is_stable_across_recomposition() {
        let dir = tempdir().expect("tempdir");
        write_file(dir.path(), "regs.isa", "registers { sfr PC 32 }");
        let main = write_file(
            dir.path(),
            "main.isa",
            "#include \"regs.isa\"\narchitecture Finger { }\n",
        );

        let mut first = IsaComposer::new();
        first.compose(&main).expect("compose");
        let mut second = IsaComposer::new();
        second.compose(&main).expect("compose");
        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);

        write_file(dir.path(), "regs.isa", "registers { sfr PC 64 }");
        let mut third = IsaComposer::new();
        third.compose(&main).expect("compose");
        assert_ne!(first.fingerprint(), third.fingerprint());
    }

    #[test]
    fn missing_include_names_the_file() {
        let dir = tempdir().expect("tempdir");
        let main = write_file(dir.path(), "main.isa", "#include \"nowhere.isa\"\n");

        let err = compose_file(&main).unwrap_err();
        match err {
            IsaError::Io(io_err) => {
                assert!(io_err.to_string().contains("nowhere.isa"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
