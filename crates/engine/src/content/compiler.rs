use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{debug, info};

use crate::AppPaths;

use super::database::{ArchetypeDef, ArchetypeId, ArchetypeRole, DefDatabase};

const DEFAULT_MAX_HEALTH: i32 = 100;
const DEFAULT_ATTACK_DISTANCE: f32 = 2.0;
const DEFAULT_ATTACK_DELAY_SECONDS: f32 = 1.0;
const DEFAULT_WALK_SPEED: f32 = 2.0;
const DEFAULT_RUN_SPEED: f32 = 4.0;
const DEFAULT_DESCRIPTION: &str = "No description";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    MissingContentDir,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

/// Compiles every `*.xml` under the base content directory into a `DefDatabase`.
///
/// Files are visited in normalized relative-path order. A `defName` may appear only once
/// across all files; ids are assigned in `defName` order so they stay stable when files
/// are renamed or split.
pub fn compile_def_database(app_paths: &AppPaths) -> Result<DefDatabase, ContentCompileError> {
    let content_dir = &app_paths.base_content_dir;
    if !content_dir.is_dir() {
        return Err(ContentCompileError {
            code: ContentErrorCode::MissingContentDir,
            message: "base content directory does not exist".to_string(),
            file_path: content_dir.clone(),
            location: None,
        });
    }

    let xml_files = collect_xml_files_sorted(content_dir)
        .map_err(|error| read_error(error.path, error.source))?;

    let mut merged = BTreeMap::<String, ArchetypeDef>::new();
    let mut seen_def_names = HashSet::<String>::new();
    for xml_file in &xml_files {
        let raw = fs::read_to_string(xml_file)
            .map_err(|source| read_error(xml_file.clone(), source))?;
        let doc = Document::parse(&raw).map_err(|error| ContentCompileError {
            code: ContentErrorCode::XmlMalformed,
            message: format!("malformed XML: {error}"),
            file_path: xml_file.clone(),
            location: Some(SourceLocation {
                line: error.pos().row as usize,
                column: error.pos().col as usize,
            }),
        })?;
        let ctx = DocContext {
            file_path: xml_file,
            doc: &doc,
        };

        for (def, node) in parse_defs_document(&ctx)? {
            if !seen_def_names.insert(def.def_name.clone()) {
                return Err(ctx.error_at(
                    ContentErrorCode::DuplicateDef,
                    format!(
                        "duplicate ArchetypeDef '{}'; each defName may be defined only once",
                        def.def_name
                    ),
                    node,
                ));
            }
            debug!(def_name = def.def_name.as_str(), role = ?def.role, "archetype_def_parsed");
            merged.insert(def.def_name.clone(), def);
        }
    }

    let database = DefDatabase::from_archetypes(merged.into_values().collect());
    info!(
        file_count = xml_files.len(),
        archetype_count = database.archetypes().len(),
        "def_database_compiled"
    );
    Ok(database)
}

struct DocContext<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl DocContext<'_, '_> {
    fn error_at(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentCompileError {
        let pos = self.doc.text_pos_at(node.range().start);
        ContentCompileError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }

    fn required_text(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<String, ContentCompileError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                ContentErrorCode::MissingField,
                format!("field <{}> must not be empty", field_name),
                node,
            ));
        }
        Ok(value)
    }

    fn non_negative_i32(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<i32, ContentCompileError> {
        let value = self.required_text(node, field_name)?;
        let parsed = value.parse::<i32>().map_err(|_| {
            self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{} '{}' is not a valid integer", field_name, value),
                node,
            )
        })?;
        if parsed < 0 {
            return Err(self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{} must be >= 0", field_name),
                node,
            ));
        }
        Ok(parsed)
    }

    fn non_negative_f32(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<f32, ContentCompileError> {
        let value = self.required_text(node, field_name)?;
        let parsed = value.parse::<f32>().map_err(|_| {
            self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{} '{}' is not a valid number", field_name, value),
                node,
            )
        })?;
        if !parsed.is_finite() || parsed < 0.0 {
            return Err(self.error_at(
                ContentErrorCode::InvalidValue,
                format!("{} must be finite and >= 0", field_name),
                node,
            ));
        }
        Ok(parsed)
    }
}

fn parse_defs_document<'a, 'input>(
    ctx: &DocContext<'a, 'input>,
) -> Result<Vec<(ArchetypeDef, Node<'a, 'input>)>, ContentCompileError> {
    let root = ctx.doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    let mut defs = Vec::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "ArchetypeDef" {
            return Err(ctx.error_at(
                ContentErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; only <ArchetypeDef> is recognized",
                    child.tag_name().name()
                ),
                child,
            ));
        }
        defs.push((parse_archetype_def(ctx, child)?, child));
    }

    Ok(defs)
}

fn parse_archetype_def(
    ctx: &DocContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<ArchetypeDef, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut def_name: Option<String> = None;
    let mut label: Option<String> = None;
    let mut role: Option<ArchetypeRole> = None;
    let mut def = ArchetypeDef {
        id: ArchetypeId(0),
        def_name: String::new(),
        label: String::new(),
        description: DEFAULT_DESCRIPTION.to_string(),
        role: ArchetypeRole::Npc,
        max_health: DEFAULT_MAX_HEALTH,
        max_mana: 0,
        armor: 0,
        attack_power: 0,
        attack_distance: DEFAULT_ATTACK_DISTANCE,
        aggression_range: 0.0,
        attack_delay_seconds: DEFAULT_ATTACK_DELAY_SECONDS,
        walk_speed: DEFAULT_WALK_SPEED,
        run_speed: DEFAULT_RUN_SPEED,
        experience_reward: 0,
        health_reward: 0,
        mana_reward: 0,
    };

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(ctx.error_at(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{}> in <ArchetypeDef>", field_name),
                field,
            ));
        }

        match field_name.as_str() {
            "defName" => def_name = Some(ctx.required_text(field, "defName")?),
            "label" => label = Some(ctx.required_text(field, "label")?),
            "description" => def.description = ctx.required_text(field, "description")?,
            "role" => {
                let value = ctx.required_text(field, "role")?;
                let Some(parsed) = ArchetypeRole::parse(&value) else {
                    return Err(ctx.error_at(
                        ContentErrorCode::InvalidValue,
                        format!(
                            "invalid role '{}'; allowed values: Player, Hostile, Npc",
                            value
                        ),
                        field,
                    ));
                };
                role = Some(parsed);
            }
            "maxHealth" => def.max_health = ctx.non_negative_i32(field, "maxHealth")?,
            "maxMana" => def.max_mana = ctx.non_negative_i32(field, "maxMana")?,
            "armor" => def.armor = ctx.non_negative_i32(field, "armor")?,
            "attackPower" => def.attack_power = ctx.non_negative_i32(field, "attackPower")?,
            "attackDistance" => {
                def.attack_distance = ctx.non_negative_f32(field, "attackDistance")?
            }
            "aggressionRange" => {
                def.aggression_range = ctx.non_negative_f32(field, "aggressionRange")?
            }
            "attackDelay" => {
                def.attack_delay_seconds = ctx.non_negative_f32(field, "attackDelay")?
            }
            "walkSpeed" => def.walk_speed = ctx.non_negative_f32(field, "walkSpeed")?,
            "runSpeed" => def.run_speed = ctx.non_negative_f32(field, "runSpeed")?,
            "experienceReward" => {
                def.experience_reward = ctx.non_negative_i32(field, "experienceReward")?
            }
            "healthReward" => def.health_reward = ctx.non_negative_i32(field, "healthReward")?,
            "manaReward" => def.mana_reward = ctx.non_negative_i32(field, "manaReward")?,
            _ => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{}> in <ArchetypeDef>", field_name),
                    field,
                ))
            }
        }
    }

    let Some(def_name) = def_name else {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            "missing required field <defName> in <ArchetypeDef>".to_string(),
            node,
        ));
    };
    let Some(label) = label else {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            "missing required field <label> in <ArchetypeDef>".to_string(),
            node,
        ));
    };
    let Some(role) = role else {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            "missing required field <role> in <ArchetypeDef>".to_string(),
            node,
        ));
    };
    if role == ArchetypeRole::Hostile && def.aggression_range <= 0.0 {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidValue,
            format!("hostile '{}' needs aggressionRange > 0", def_name),
            node,
        ));
    }

    def.def_name = def_name;
    def.label = label;
    def.role = role;
    Ok(def)
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_cached_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read XML file: {source}"),
        file_path: path,
        location: None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const WOLF: &str = r#"<ArchetypeDef>
        <defName>Wolf</defName>
        <label>Wolf</label>
        <description>A lean grey hunter.</description>
        <role>Hostile</role>
        <maxHealth>60</maxHealth>
        <armor>5</armor>
        <attackPower>12</attackPower>
        <attackDistance>1.5</attackDistance>
        <aggressionRange>10</aggressionRange>
        <attackDelay>1.2</attackDelay>
        <walkSpeed>2</walkSpeed>
        <runSpeed>6</runSpeed>
        <experienceReward>40</experienceReward>
        <healthReward>10</healthReward>
        <manaReward>5</manaReward>
    </ArchetypeDef>"#;

    fn setup_app_paths(root: &Path) -> AppPaths {
        let base = root.join("assets").join("base");
        fs::create_dir_all(&base).expect("base");
        AppPaths {
            root: root.to_path_buf(),
            base_content_dir: base,
        }
    }

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    #[test]
    fn valid_compile_assigns_stable_ids_by_def_name() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            r#"<Defs>
                <ArchetypeDef><defName>zeta</defName><label>Zeta</label><role>Npc</role></ArchetypeDef>
                <ArchetypeDef><defName>alpha</defName><label>Alpha</label><role>Player</role></ArchetypeDef>
            </Defs>"#,
        );
        let db = compile_def_database(&app).expect("compile");
        let alpha = db.archetype_id_by_name("alpha").expect("alpha");
        let zeta = db.archetype_id_by_name("zeta").expect("zeta");
        assert!(alpha.0 < zeta.0);
    }

    #[test]
    fn hostile_fields_are_parsed() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("hostiles").join("wolf.xml"),
            &format!("<Defs>{WOLF}</Defs>"),
        );
        let db = compile_def_database(&app).expect("compile");
        let wolf = db.archetype_by_name("Wolf").expect("wolf");
        assert_eq!(wolf.role, ArchetypeRole::Hostile);
        assert_eq!(wolf.max_health, 60);
        assert_eq!(wolf.armor, 5);
        assert_eq!(wolf.attack_power, 12);
        assert_eq!(wolf.experience_reward, 40);
        assert!((wolf.aggression_range - 10.0).abs() < f32::EPSILON);
        assert!((wolf.run_speed - 6.0).abs() < f32::EPSILON);
        assert_eq!(wolf.description, "A lean grey hunter.");
    }

    #[test]
    fn optional_fields_take_defaults() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            r#"<Defs><ArchetypeDef><defName>a</defName><label>A</label><role>Npc</role></ArchetypeDef></Defs>"#,
        );
        let db = compile_def_database(&app).expect("compile");
        let def = db.archetype_by_name("a").expect("def");
        assert_eq!(def.max_health, DEFAULT_MAX_HEALTH);
        assert_eq!(def.description, DEFAULT_DESCRIPTION);
        assert!((def.walk_speed - DEFAULT_WALK_SPEED).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_def_name_reports_file_and_location() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            r#"<Defs><ArchetypeDef><label>X</label><role>Npc</role></ArchetypeDef></Defs>"#,
        );
        let err = compile_def_database(&app).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::MissingField);
        assert!(err
            .file_path
            .ends_with(Path::new("assets").join("base").join("defs.xml")));
        assert!(err.location.is_some());
    }

    #[test]
    fn unknown_field_errors() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            r#"<Defs><ArchetypeDef><defName>a</defName><label>A</label><role>Npc</role><mood>Happy</mood></ArchetypeDef></Defs>"#,
        );
        let err = compile_def_database(&app).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::UnknownField);
    }

    #[test]
    fn invalid_role_errors() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            r#"<Defs><ArchetypeDef><defName>a</defName><label>A</label><role>Boss</role></ArchetypeDef></Defs>"#,
        );
        let err = compile_def_database(&app).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn negative_numbers_are_rejected() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            r#"<Defs><ArchetypeDef><defName>a</defName><label>A</label><role>Npc</role><armor>-3</armor></ArchetypeDef></Defs>"#,
        );
        let err = compile_def_database(&app).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn hostile_without_aggression_range_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            r#"<Defs><ArchetypeDef><defName>a</defName><label>A</label><role>Hostile</role></ArchetypeDef></Defs>"#,
        );
        let err = compile_def_database(&app).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn malformed_xml_reports_location() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            r#"<Defs><ArchetypeDef><defName>a</defName></Defs>"#,
        );
        let err = compile_def_database(&app).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::XmlMalformed);
        assert!(err.location.is_some());
    }

    #[test]
    fn duplicate_def_across_files_errors() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("a.xml"),
            &format!("<Defs>{WOLF}</Defs>"),
        );
        write_file(
            &app.base_content_dir.join("b.xml"),
            &format!("<Defs>{WOLF}</Defs>"),
        );
        let err = compile_def_database(&app).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::DuplicateDef);
        assert!(err.file_path.ends_with("b.xml"));
    }

    #[test]
    fn missing_content_dir_errors() {
        let temp = TempDir::new().expect("temp");
        let app = AppPaths {
            root: temp.path().to_path_buf(),
            base_content_dir: temp.path().join("nowhere"),
        };
        let err = compile_def_database(&app).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::MissingContentDir);
    }

    #[test]
    fn shipped_archetypes_compile() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
        let app = AppPaths {
            base_content_dir: root.join("assets").join("base"),
            root,
        };
        let db = compile_def_database(&app).expect("compile");
        for name in ["Rabbit", "Wolf", "Goblin"] {
            let def = db.archetype_by_name(name).expect("hostile");
            assert_eq!(def.role, ArchetypeRole::Hostile);
        }
        assert_eq!(db.archetypes_with_role(ArchetypeRole::Player).count(), 2);
        assert_eq!(db.archetypes_with_role(ArchetypeRole::Npc).count(), 1);
    }
}
