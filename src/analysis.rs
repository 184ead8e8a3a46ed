use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::context::{ResolutionContext, Symbol, SymbolKind};
use crate::error::CompilerError;
use crate::lexer::keyword;

const SCRIPTS_DIR: &str = "scripts";
const OBJECTS_DIR: &str = "objects";
const SOURCE_EXTENSION: &str = "gml";

static COMMENT_PATTERN: OnceLock<Regex> = OnceLock::new();
static ENUM_PATTERN: OnceLock<Regex> = OnceLock::new();
static MEMBER_PATTERN: OnceLock<Regex> = OnceLock::new();
static CALL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("hard-coded pattern is valid"))
}

/// Harvests user symbols from a project directory so a resolution context
/// can be built without the binary container.
#[derive(Debug, Default)]
pub struct SymbolScan {
    pub scripts: BTreeSet<String>,
    pub objects: BTreeSet<String>,
    pub enums: BTreeMap<String, BTreeMap<String, i64>>,
    pub calls: BTreeSet<String>,
    pub files: usize,
}

impl SymbolScan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan_directory(&mut self, root: &Path) -> Result<(), CompilerError> {
        if !root.is_dir() {
            return Err(CompilerError::FileNotFound(format!(
                "Expected {} to be a project directory",
                root.display()
            )));
        }

        let scripts = root.join(SCRIPTS_DIR);
        if scripts.is_dir() {
            let mut callback = |scan: &mut Self, path: &Path| -> Result<(), CompilerError> {
                if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                    scan.scripts.insert(name.to_string());
                }
                scan.analyze_source(&fs::read_to_string(path)?);
                Ok(())
            };
            self.walk_directory(&scripts, &mut callback)?;
        }

        let objects = root.join(OBJECTS_DIR);
        if objects.is_dir() {
            for entry in fs::read_dir(&objects)? {
                let path = entry?.path();
                if !path.is_dir() {
                    continue;
                }
                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    self.objects.insert(name.to_string());
                }
                let mut callback = |scan: &mut Self, path: &Path| -> Result<(), CompilerError> {
                    scan.analyze_source(&fs::read_to_string(path)?);
                    Ok(())
                };
                self.walk_directory(&path, &mut callback)?;
            }
        }

        Ok(())
    }

    fn walk_directory<F>(&mut self, dir: &Path, callback: &mut F) -> Result<(), CompilerError>
    where
        F: FnMut(&mut Self, &Path) -> Result<(), CompilerError>,
    {
        let mut entries = fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                self.walk_directory(&path, callback)?;
            } else if path.extension().and_then(|ext| ext.to_str()) == Some(SOURCE_EXTENSION) {
                self.files += 1;
                callback(self, &path)?;
            }
        }
        Ok(())
    }

    /// Collects enum declarations and called names from one source file.
    pub fn analyze_source(&mut self, contents: &str) {
        let comments = pattern(&COMMENT_PATTERN, r"(?s)//[^\n]*|/\*.*?\*/");
        let contents = comments.replace_all(contents, " ");

        let enums = pattern(&ENUM_PATTERN, r"\benum\s+([A-Za-z_]\w*)\s*\{([^}]*)\}");
        for cap in enums.captures_iter(&contents) {
            if let (Some(name), Some(body)) = (cap.get(1), cap.get(2)) {
                let members = Self::analyze_enum_body(body.as_str());
                self.enums.insert(name.as_str().to_string(), members);
            }
        }

        let calls = pattern(&CALL_PATTERN, r"\b([A-Za-z_]\w*)\s*\(");
        for cap in calls.captures_iter(&contents) {
            if let Some(name) = cap.get(1) {
                if keyword(name.as_str()).is_none() {
                    self.calls.insert(name.as_str().to_string());
                }
            }
        }
    }

    fn analyze_enum_body(body: &str) -> BTreeMap<String, i64> {
        let member = pattern(
            &MEMBER_PATTERN,
            r"^\s*([A-Za-z_]\w*)\s*(?:=\s*(-?(?:0[xX][0-9a-fA-F]+|\$[0-9a-fA-F]+|\d+)))?\s*$",
        );

        let mut members = BTreeMap::new();
        let mut next = 0i64;
        for entry in body.split(',') {
            let Some(cap) = member.captures(entry) else {
                continue;
            };
            let Some(name) = cap.get(1) else {
                continue;
            };
            let value = cap
                .get(2)
                .and_then(|literal| parse_literal(literal.as_str()))
                .unwrap_or(next);
            members.insert(name.as_str().to_string(), value);
            next = value.wrapping_add(1);
        }
        members
    }

    /// Adds the harvested symbols to `context`. New scripts and objects get
    /// ids after the largest existing id of their kind, in name order.
    pub fn apply(&self, context: &mut ResolutionContext) {
        for (kind, names) in [
            (SymbolKind::Script, &self.scripts),
            (SymbolKind::Object, &self.objects),
        ] {
            let mut next = context
                .user_symbols
                .values()
                .filter(|symbol| symbol.kind == kind)
                .map(|symbol| symbol.reference + 1)
                .max()
                .unwrap_or(0);
            for name in names {
                if context.user_symbols.contains_key(name) {
                    continue;
                }
                context
                    .user_symbols
                    .insert(name.clone(), Symbol { kind, reference: next });
                next += 1;
            }
        }

        for (name, members) in &self.enums {
            context.enums.insert(name.clone(), members.clone());
        }
    }

    /// Called names that are neither builtins nor user symbols.
    pub fn unknown_calls(&self, context: &ResolutionContext) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|name| {
                !context.builtin_functions.contains(*name)
                    && !context.user_symbols.contains_key(*name)
                    && !self.scripts.contains(*name)
            })
            .map(String::as_str)
            .collect()
    }

    pub fn print_analysis(&self, context: &ResolutionContext) {
        println!("\n=== Symbol Scan Results ===\n");
        println!("Files scanned: {}", self.files);

        println!("\nScripts found ({})", self.scripts.len());
        for script in &self.scripts {
            println!("  - {}", script);
        }

        println!("\nObjects found ({})", self.objects.len());
        for object in &self.objects {
            println!("  - {}", object);
        }

        println!("\nEnums found ({})", self.enums.len());
        for (name, members) in &self.enums {
            println!("  - {} ({} members)", name, members.len());
        }

        let unknown = self.unknown_calls(context);
        println!("\nUnknown calls ({})", unknown.len());
        for name in unknown {
            println!("  - {}", name);
        }
    }
}

fn parse_literal(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits
        .strip_prefix('$')
        .or_else(|| digits.strip_prefix("0x"))
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gmlc-scan-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn enum_members_follow_literals() {
        let mut scan = SymbolScan::new();
        scan.analyze_source("enum Dir { Left, Up = 5, Right, Down = $10 }\n// enum Fake { A }");
        assert_eq!(scan.enums.len(), 1);
        let dir = &scan.enums["Dir"];
        assert_eq!(dir["Left"], 0);
        assert_eq!(dir["Right"], 6);
        assert_eq!(dir["Down"], 16);
    }

    #[test]
    fn collects_calls_but_not_keywords() {
        let mut scan = SymbolScan::new();
        scan.analyze_source("if (a) { draw_text(0, 0, \"x\"); } while (b) scr_move(); /* skip() */");
        assert_eq!(
            scan.calls.iter().map(String::as_str).collect::<Vec<_>>(),
            ["draw_text", "scr_move"]
        );
    }

    #[test]
    fn apply_assigns_ids_after_existing_ones() {
        let mut context = ResolutionContext::new(2)
            .with_functions(["draw_text"])
            .with_symbol("scr_old", SymbolKind::Script, 4);
        let mut scan = SymbolScan::new();
        scan.scripts.extend(["scr_b".to_string(), "scr_a".to_string(), "scr_old".to_string()]);
        scan.objects.insert("obj_wall".to_string());
        scan.calls.extend(["draw_text".to_string(), "scr_a".to_string(), "mystery".to_string()]);

        scan.apply(&mut context);
        assert_eq!(context.user_symbols["scr_old"].reference, 4);
        assert_eq!(context.user_symbols["scr_a"].reference, 5);
        assert_eq!(context.user_symbols["scr_b"].reference, 6);
        assert_eq!(context.user_symbols["obj_wall"].reference, 0);
        assert_eq!(scan.unknown_calls(&context), ["mystery"]);
    }

    #[test]
    fn scans_project_layout() {
        let root = scratch_dir("layout");
        fs::create_dir_all(root.join("scripts/util")).unwrap();
        fs::create_dir_all(root.join("objects/obj_player")).unwrap();
        fs::write(root.join("scripts/scr_jump.gml"), "enum Mode { Off, On }").unwrap();
        fs::write(root.join("scripts/util/scr_clamp.gml"), "return clamp(argument0, 0, 1);").unwrap();
        fs::write(root.join("scripts/notes.txt"), "not_a_call()").unwrap();
        fs::write(root.join("objects/obj_player/Step_0.gml"), "scr_jump();").unwrap();

        let mut scan = SymbolScan::new();
        scan.scan_directory(&root).unwrap();
        assert_eq!(scan.files, 3);
        assert!(scan.scripts.contains("scr_jump") && scan.scripts.contains("scr_clamp"));
        assert!(scan.objects.contains("obj_player"));
        assert_eq!(scan.enums["Mode"]["On"], 1);
        assert!(scan.calls.contains("clamp") && !scan.calls.contains("not_a_call"));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_directory_is_reported() {
        let mut scan = SymbolScan::new();
        let err = scan.scan_directory(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, CompilerError::FileNotFound(_)));
    }
}
