//! Practice task generation.
//!
//! Every [`PartOfSpeech`] maps to an ordered slice of [`TaskTemplate`]s.
//! A template emits a task when its availability predicate holds; the
//! prompt/solution pair is then checked against the [`TaskTypeRegistry`]
//! before the task is accepted.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use lexsync_shared::{
    AggregatedWord, Auxiliary, GovernedCase, LexsyncError, PartOfSpeech, Renderer, Result,
    TaskSpecSeed, checksum_json,
};

/// Gap marker every cloze prompt must contain.
pub const CLOZE_GAP: &str = "___";

// ---------------------------------------------------------------------------
// Task type registry
// ---------------------------------------------------------------------------

/// Maps task types to their renderer and enforces the renderer's shape.
#[derive(Debug, Clone)]
pub struct TaskTypeRegistry {
    renderers: BTreeMap<String, Renderer>,
}

impl TaskTypeRegistry {
    /// Registry with every built-in task type.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for (task_type, renderer) in [
            ("verb_praeteritum", Renderer::Cloze),
            ("verb_partizip", Renderer::Cloze),
            ("verb_auxiliary", Renderer::MultipleChoice),
            ("verb_praesens", Renderer::Cloze),
            ("noun_article", Renderer::MultipleChoice),
            ("noun_plural", Renderer::FreeText),
            ("comparative", Renderer::FreeText),
            ("superlative", Renderer::FreeText),
            ("preposition_case", Renderer::MultipleChoice),
            ("translation", Renderer::FreeText),
        ] {
            registry.register(task_type, renderer);
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            renderers: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, task_type: &str, renderer: Renderer) {
        self.renderers.insert(task_type.to_string(), renderer);
    }

    pub fn renderer(&self, task_type: &str) -> Option<Renderer> {
        self.renderers.get(task_type).copied()
    }

    /// Check a prompt/solution pair against the renderer of `task_type`.
    pub fn validate(
        &self,
        task_type: &str,
        prompt: &Value,
        solution: &Value,
    ) -> std::result::Result<Renderer, String> {
        let renderer = self
            .renderer(task_type)
            .ok_or_else(|| format!("unregistered task type '{task_type}'"))?;

        let answer = non_empty(solution, "answer").ok_or("solution has no answer")?;
        match renderer {
            Renderer::Cloze => {
                let text = non_empty(prompt, "text").ok_or("cloze prompt has no text")?;
                if !text.contains(CLOZE_GAP) {
                    return Err(format!("cloze prompt lacks the {CLOZE_GAP} gap"));
                }
            }
            Renderer::MultipleChoice => {
                let options: Vec<&str> = prompt
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|o| o.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                let mut distinct = options.clone();
                distinct.sort_unstable();
                distinct.dedup();
                if distinct.len() < 2 {
                    return Err("multiple choice needs at least two distinct options".into());
                }
                if !options.contains(&answer) {
                    return Err(format!("answer '{answer}' is not among the options"));
                }
            }
            Renderer::FreeText => {
                non_empty(prompt, "instruction").ok_or("free text prompt has no instruction")?;
            }
        }
        Ok(renderer)
    }
}

impl Default for TaskTypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn non_empty<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

static STANDARD_REGISTRY: LazyLock<TaskTypeRegistry> = LazyLock::new(TaskTypeRegistry::standard);

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Prompt, solution and extras produced by a template.
#[derive(Debug, Clone, Default)]
pub struct TaskBody {
    pub prompt: Value,
    pub solution: Value,
    pub hints: Vec<String>,
    pub metadata: Value,
}

/// One way of turning a word into a task.
pub struct TaskTemplate {
    pub key: &'static str,
    pub task_type: &'static str,
    pub available: fn(&AggregatedWord) -> bool,
    pub build: fn(&AggregatedWord) -> TaskBody,
}

static VERB_TEMPLATES: [TaskTemplate; 5] = [
    TaskTemplate {
        key: "verb-past",
        task_type: "verb_praeteritum",
        available: has_praeteritum,
        build: verb_past,
    },
    TaskTemplate {
        key: "verb-participle",
        task_type: "verb_partizip",
        available: has_partizip,
        build: verb_participle,
    },
    TaskTemplate {
        key: "verb-auxiliary",
        task_type: "verb_auxiliary",
        available: has_auxiliary,
        build: verb_auxiliary,
    },
    TaskTemplate {
        key: "verb-present",
        task_type: "verb_praesens",
        available: has_praesens,
        build: verb_present,
    },
    TRANSLATION,
];

static NOUN_TEMPLATES: [TaskTemplate; 3] = [
    TaskTemplate {
        key: "noun-article",
        task_type: "noun_article",
        available: has_gender,
        build: noun_article,
    },
    TaskTemplate {
        key: "noun-plural",
        task_type: "noun_plural",
        available: has_plural,
        build: noun_plural,
    },
    TRANSLATION,
];

static DEGREE_TEMPLATES: [TaskTemplate; 3] = [
    TaskTemplate {
        key: "degree-comparative",
        task_type: "comparative",
        available: has_comparative,
        build: comparative,
    },
    TaskTemplate {
        key: "degree-superlative",
        task_type: "superlative",
        available: has_superlative,
        build: superlative,
    },
    TRANSLATION,
];

static PREPOSITION_TEMPLATES: [TaskTemplate; 2] = [
    TaskTemplate {
        key: "preposition-case",
        task_type: "preposition_case",
        available: has_cases,
        build: preposition_case,
    },
    TRANSLATION,
];

static BASIC_TEMPLATES: [TaskTemplate; 1] = [TRANSLATION];

const TRANSLATION: TaskTemplate = TaskTemplate {
    key: "translation",
    task_type: "translation",
    available: has_gloss,
    build: translation,
};

/// Templates for `pos`, in emission order.
pub fn templates_for(pos: PartOfSpeech) -> &'static [TaskTemplate] {
    match pos {
        PartOfSpeech::Verb => &VERB_TEMPLATES,
        PartOfSpeech::Noun => &NOUN_TEMPLATES,
        PartOfSpeech::Adjective | PartOfSpeech::Adverb => &DEGREE_TEMPLATES,
        PartOfSpeech::Preposition => &PREPOSITION_TEMPLATES,
        PartOfSpeech::Conjunction
        | PartOfSpeech::Pronoun
        | PartOfSpeech::Article
        | PartOfSpeech::Numeral
        | PartOfSpeech::Interjection
        | PartOfSpeech::Particle => &BASIC_TEMPLATES,
    }
}

fn has_praeteritum(w: &AggregatedWord) -> bool {
    w.fields.praeteritum.is_some()
}
fn has_partizip(w: &AggregatedWord) -> bool {
    w.fields.partizip_ii.is_some()
}
fn has_auxiliary(w: &AggregatedWord) -> bool {
    w.fields.auxiliary.is_some()
}
fn has_praesens(w: &AggregatedWord) -> bool {
    w.fields.praesens_er.is_some()
}
fn has_gender(w: &AggregatedWord) -> bool {
    w.fields.gender.is_some()
}
fn has_plural(w: &AggregatedWord) -> bool {
    w.fields.plural.is_some()
}
fn has_comparative(w: &AggregatedWord) -> bool {
    w.fields.comparative.is_some()
}
fn has_superlative(w: &AggregatedWord) -> bool {
    w.fields.superlative.is_some()
}
fn has_cases(w: &AggregatedWord) -> bool {
    !w.fields.cases.is_empty()
}
fn has_gloss(w: &AggregatedWord) -> bool {
    w.gloss().is_some()
}

fn form(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn gloss_hints(word: &AggregatedWord) -> Vec<String> {
    word.gloss().map(|g| vec![g.to_string()]).unwrap_or_default()
}

fn verb_metadata(word: &AggregatedWord) -> Value {
    match word.fields.auxiliary {
        Some(aux) => json!({ "aux": aux.as_str() }),
        None => json!({}),
    }
}

fn verb_past(word: &AggregatedWord) -> TaskBody {
    TaskBody {
        prompt: json!({
            "text": format!("Gestern {CLOZE_GAP} er. ({})", word.lemma),
            "lemma": word.lemma,
        }),
        solution: json!({ "answer": form(&word.fields.praeteritum) }),
        hints: gloss_hints(word),
        metadata: verb_metadata(word),
    }
}

fn verb_participle(word: &AggregatedWord) -> TaskBody {
    let aux = match word.fields.auxiliary {
        Some(Auxiliary::Haben) => "hat",
        Some(Auxiliary::Sein) => "ist",
        None => "hat/ist",
    };
    TaskBody {
        prompt: json!({
            "text": format!("Er {aux} {CLOZE_GAP}. ({})", word.lemma),
            "lemma": word.lemma,
        }),
        solution: json!({ "answer": form(&word.fields.partizip_ii) }),
        hints: gloss_hints(word),
        metadata: verb_metadata(word),
    }
}

fn verb_auxiliary(word: &AggregatedWord) -> TaskBody {
    let answer = word.fields.auxiliary.map(|a| a.as_str()).unwrap_or_default();
    TaskBody {
        prompt: json!({
            "question": format!("Welches Hilfsverb bildet das Perfekt von „{}“?", word.lemma),
            "options": [Auxiliary::Haben.as_str(), Auxiliary::Sein.as_str()],
        }),
        solution: json!({ "answer": answer }),
        hints: Vec::new(),
        metadata: verb_metadata(word),
    }
}

fn verb_present(word: &AggregatedWord) -> TaskBody {
    TaskBody {
        prompt: json!({
            "text": format!("Heute {CLOZE_GAP} er. ({})", word.lemma),
            "lemma": word.lemma,
        }),
        solution: json!({ "answer": form(&word.fields.praesens_er) }),
        hints: gloss_hints(word),
        metadata: verb_metadata(word),
    }
}

fn noun_article(word: &AggregatedWord) -> TaskBody {
    let answer = word.fields.gender.map(|g| g.article()).unwrap_or_default();
    TaskBody {
        prompt: json!({
            "question": format!("{CLOZE_GAP} {}", word.lemma),
            "options": ["der", "die", "das"],
        }),
        solution: json!({ "answer": answer }),
        hints: gloss_hints(word),
        metadata: json!({}),
    }
}

fn noun_plural(word: &AggregatedWord) -> TaskBody {
    let singular = match word.fields.gender {
        Some(g) => format!("{} {}", g.article(), word.lemma),
        None => word.lemma.clone(),
    };
    TaskBody {
        prompt: json!({ "instruction": format!("Wie lautet der Plural von „{singular}“?") }),
        solution: json!({ "answer": form(&word.fields.plural) }),
        hints: gloss_hints(word),
        metadata: json!({}),
    }
}

fn comparative(word: &AggregatedWord) -> TaskBody {
    TaskBody {
        prompt: json!({ "instruction": format!("Bilde den Komparativ von „{}“.", word.lemma) }),
        solution: json!({ "answer": form(&word.fields.comparative) }),
        hints: gloss_hints(word),
        metadata: json!({}),
    }
}

fn superlative(word: &AggregatedWord) -> TaskBody {
    TaskBody {
        prompt: json!({ "instruction": format!("Bilde den Superlativ von „{}“.", word.lemma) }),
        solution: json!({ "answer": form(&word.fields.superlative) }),
        hints: gloss_hints(word),
        metadata: json!({}),
    }
}

fn preposition_case(word: &AggregatedWord) -> TaskBody {
    let answer = word
        .fields
        .cases
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join("/");
    let mut options: Vec<String> = [
        GovernedCase::Accusative,
        GovernedCase::Dative,
        GovernedCase::Genitive,
    ]
    .iter()
    .map(|c| c.label().to_string())
    .collect();
    if !options.contains(&answer) {
        options.push(answer.clone());
    }

    let mut metadata = json!({});
    if let Some(notes) = &word.fields.usage_notes {
        metadata["usageNotes"] = json!(notes);
    }
    TaskBody {
        prompt: json!({
            "question": format!("Welchen Kasus verlangt „{}“?", word.lemma),
            "options": options,
        }),
        solution: json!({ "answer": answer }),
        hints: Vec::new(),
        metadata,
    }
}

fn translation(word: &AggregatedWord) -> TaskBody {
    TaskBody {
        prompt: json!({ "instruction": format!("Übersetze „{}“ ins Englische.", word.lemma) }),
        solution: json!({
            "answer": word.gloss().unwrap_or_default(),
            "accepted": word.fields.translations,
        }),
        hints: word.fields.examples.iter().take(1).cloned().collect(),
        metadata: json!({}),
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskKey<'a> {
    lexeme_id: &'a str,
    task_type: &'a str,
    revision: u32,
    template_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskContent<'a> {
    task_type: &'a str,
    renderer: &'a str,
    prompt: &'a Value,
    solution: &'a Value,
    hints: &'a [String],
    metadata: &'a Value,
    revision: u32,
}

/// Generate every available task for `word` with the built-in registry.
pub fn generate_tasks(word: &AggregatedWord, lexeme_id: &str) -> Result<Vec<TaskSpecSeed>> {
    generate_tasks_with(&STANDARD_REGISTRY, word, lexeme_id)
}

/// Generate every available task for `word`, validating against `registry`.
///
/// A task that fails validation aborts generation for this word only.
pub fn generate_tasks_with(
    registry: &TaskTypeRegistry,
    word: &AggregatedWord,
    lexeme_id: &str,
) -> Result<Vec<TaskSpecSeed>> {
    let pos = word.pos.known().ok_or_else(|| LexsyncError::UnsupportedPos {
        lemma: word.lemma.clone(),
        pos: word.pos.code().to_string(),
    })?;

    let mut tasks: Vec<TaskSpecSeed> = Vec::new();
    for template in templates_for(pos) {
        if !(template.available)(word) {
            continue;
        }

        let body = (template.build)(word);
        let renderer = registry
            .validate(template.task_type, &body.prompt, &body.solution)
            .map_err(|message| LexsyncError::Template {
                lexeme_id: lexeme_id.to_string(),
                template: template.key.to_string(),
                message,
            })?;

        let revision = u32::try_from(tasks.len() + 1).unwrap_or(u32::MAX);
        let mut id = checksum_json(&TaskKey {
            lexeme_id,
            task_type: template.task_type,
            revision,
            template_key: template.key,
        });
        id.truncate(16);

        let mut metadata = body.metadata;
        if !metadata.is_object() {
            metadata = json!({});
        }
        metadata["template"] = json!(template.key);
        if let Some(level) = &word.fields.level {
            metadata["level"] = json!(level);
        }

        let checksum = checksum_json(&TaskContent {
            task_type: template.task_type,
            renderer: renderer.as_str(),
            prompt: &body.prompt,
            solution: &body.solution,
            hints: &body.hints,
            metadata: &metadata,
            revision,
        });

        tasks.push(TaskSpecSeed {
            id,
            lexeme_id: lexeme_id.to_string(),
            pos,
            task_type: template.task_type.to_string(),
            renderer,
            prompt: body.prompt,
            solution: body.solution,
            hints: body.hints,
            metadata,
            revision,
            checksum,
        });
    }

    debug!(lexeme_id, tasks = tasks.len(), "generated tasks");
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_shared::Gender;

    fn gehen() -> AggregatedWord {
        let mut w = AggregatedWord {
            lemma: "gehen".into(),
            pos: PartOfSpeech::Verb.into(),
            sources: vec!["curated-jsonl".into()],
            ..AggregatedWord::default()
        };
        w.fields.translations = vec!["to go".into()];
        w.fields.praesens_er = Some("geht".into());
        w.fields.praeteritum = Some("ging".into());
        w.fields.partizip_ii = Some("gegangen".into());
        w.fields.auxiliary = Some(Auxiliary::Sein);
        w
    }

    #[test]
    fn verb_tasks_in_template_order() {
        let tasks = generate_tasks(&gehen(), "de:verb:gehen:abcd1234").unwrap();
        let types: Vec<&str> = tasks.iter().map(|t| t.task_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["verb_praeteritum", "verb_partizip", "verb_auxiliary", "verb_praesens", "translation"]
        );
        let revisions: Vec<u32> = tasks.iter().map(|t| t.revision).collect();
        assert_eq!(revisions, vec![1, 2, 3, 4, 5]);
        for task in &tasks[..4] {
            assert_eq!(task.metadata["aux"], "sein");
        }
    }

    #[test]
    fn cloze_prompts_contain_gap() {
        let tasks = generate_tasks(&gehen(), "lx").unwrap();
        let past = &tasks[0];
        assert_eq!(past.renderer, Renderer::Cloze);
        assert!(past.prompt["text"].as_str().unwrap().contains(CLOZE_GAP));
        assert_eq!(past.solution["answer"], "ging");
    }

    #[test]
    fn task_ids_are_deterministic_and_distinct() {
        let a = generate_tasks(&gehen(), "lx").unwrap();
        let b = generate_tasks(&gehen(), "lx").unwrap();
        assert_eq!(a, b);
        let mut ids: Vec<&str> = a.iter().map(|t| t.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), a.len());
        assert!(a.iter().all(|t| t.id.len() == 16));
    }

    #[test]
    fn noun_without_plural_has_no_plural_task() {
        let mut haus = AggregatedWord {
            lemma: "Haus".into(),
            pos: PartOfSpeech::Noun.into(),
            ..AggregatedWord::default()
        };
        haus.fields.gender = Some(Gender::Neuter);
        let tasks = generate_tasks(&haus, "lx").unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_type, "noun_article");
        assert_eq!(tasks[0].solution["answer"], "das");
    }

    #[test]
    fn preposition_answer_is_an_option() {
        let mut in_ = AggregatedWord {
            lemma: "in".into(),
            pos: PartOfSpeech::Preposition.into(),
            ..AggregatedWord::default()
        };
        in_.fields.cases = vec![GovernedCase::Accusative, GovernedCase::Dative];
        let tasks = generate_tasks(&in_, "lx").unwrap();
        assert_eq!(tasks[0].solution["answer"], "Akkusativ/Dativ");
        let options = tasks[0].prompt["options"].as_array().unwrap();
        assert_eq!(options.len(), 4);
    }

    #[test]
    fn blank_form_fails_validation() {
        let mut w = gehen();
        w.fields.praeteritum = Some("   ".into());
        let err = generate_tasks(&w, "lx").unwrap_err();
        match err {
            LexsyncError::Template { template, .. } => assert_eq!(template, "verb-past"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unregistered_task_type_is_rejected() {
        let mut registry = TaskTypeRegistry::empty();
        registry.register("verb_praeteritum", Renderer::Cloze);
        let err = generate_tasks_with(&registry, &gehen(), "lx").unwrap_err();
        assert!(err.to_string().contains("verb_partizip"));
    }

    #[test]
    fn registry_rules() {
        let registry = TaskTypeRegistry::standard();
        let ok = registry.validate(
            "noun_article",
            &json!({"options": ["der", "die"]}),
            &json!({"answer": "die"}),
        );
        assert_eq!(ok, Ok(Renderer::MultipleChoice));

        let same_options = registry.validate(
            "noun_article",
            &json!({"options": ["der", "der"]}),
            &json!({"answer": "der"}),
        );
        assert!(same_options.is_err());

        let no_gap = registry.validate(
            "verb_praesens",
            &json!({"text": "er geht"}),
            &json!({"answer": "geht"}),
        );
        assert!(no_gap.is_err());

        let no_instruction = registry.validate(
            "translation",
            &json!({"instruction": ""}),
            &json!({"answer": "house"}),
        );
        assert!(no_instruction.is_err());
    }

    #[test]
    fn every_pos_has_translation_last() {
        for pos in PartOfSpeech::ALL {
            let templates = templates_for(pos);
            assert_eq!(templates.last().map(|t| t.key), Some("translation"));
        }
    }
}
