use rand::Rng;
use tracing::{debug, info, warn};

use crate::catalog::{Tag, TagCatalog};
use crate::persona::rules::{
    classify_gender, contradicts_gender, hair_conflict, is_positive_expression, Gender,
};
use crate::persona::slots::{Slot, SlotRole};
use crate::selection::DEFAULT_MAX_TOKENS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorSettings {
    pub max_tokens: usize,
    /// Chance of dropping the hair length (rather than the style) when both were drawn.
    pub hair_drop_length_probability: f64,
    /// Chance an expression slot draws from the positive subset.
    pub expression_positive_bias: f64,
    pub include_nsfw: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            max_tokens: DEFAULT_MAX_TOKENS,
            hair_drop_length_probability: 0.5,
            expression_positive_bias: 0.7,
            include_nsfw: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptySlot {
    pub slot: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationReport {
    pub tags: Vec<Tag>,
    pub new_tags: usize,
    pub empty_slots: Vec<EmptySlot>,
    pub truncated: usize,
}

impl GenerationReport {
    pub fn budget_exceeded(&self) -> bool {
        self.truncated > 0
    }

    /// Aggregate warning, raised only when the run added nothing.
    pub fn warning(&self) -> Option<String> {
        if self.new_tags > 0 || self.empty_slots.is_empty() {
            return None;
        }
        let slots = self
            .empty_slots
            .iter()
            .map(|empty| empty.slot.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "Random generation produced no new tags; no eligible candidates for: {}",
            slots
        ))
    }
}

#[derive(Debug, Clone)]
struct Pick {
    role: SlotRole,
    tag: Tag,
    locked: bool,
}

/// Accumulator threaded through the slot fold.
#[derive(Debug, Default)]
struct RunState {
    picks: Vec<Pick>,
    empty_slots: Vec<EmptySlot>,
}

impl RunState {
    fn seeded(locked: &[Tag], slots: &[Slot]) -> Self {
        let picks = locked
            .iter()
            .map(|tag| {
                let role = slots
                    .iter()
                    .find(|slot| slot.targets(&tag.category_id, tag.sub_category_id.as_deref()))
                    .map(|slot| slot.role)
                    .unwrap_or_default();
                Pick {
                    role,
                    tag: tag.clone().with_locked(true),
                    locked: true,
                }
            })
            .collect();
        RunState {
            picks,
            empty_slots: Vec::new(),
        }
    }

    fn covers(&self, slot: &Slot) -> bool {
        self.picks.iter().any(|pick| {
            pick.locked && slot.targets(&pick.tag.category_id, pick.tag.sub_category_id.as_deref())
        })
    }

    fn names_with_role(&self, role: SlotRole) -> impl Iterator<Item = &str> {
        self.picks
            .iter()
            .filter(move |pick| pick.role == role)
            .map(|pick| pick.tag.name.as_str())
    }

    fn implied_gender(&self, role: SlotRole) -> Option<Gender> {
        self.names_with_role(role).find_map(classify_gender)
    }

    fn holds(&self, candidate: &Tag) -> bool {
        self.picks.iter().any(|pick| {
            pick.tag.catalog_id() == candidate.id
                || (candidate.is_exclusive()
                    && pick.tag.is_exclusive()
                    && pick.tag.slot_key() == candidate.slot_key())
        })
    }

    fn record_empty(&mut self, slot: &Slot, reason: &str) {
        warn!("Persona slot {} left empty: {}", slot.label(), reason);
        self.empty_slots.push(EmptySlot {
            slot: slot.label(),
            reason: reason.to_string(),
        });
    }
}

fn probability_or(value: f64, default: f64) -> f64 {
    if value.is_nan() {
        warn!("Ignoring NaN probability; using {}", default);
        return default;
    }
    value.clamp(0.0, 1.0)
}

/// Constrained random sampling of a persona over an injected catalog.
pub struct PersonaGenerator<'a> {
    catalog: &'a TagCatalog,
    settings: GeneratorSettings,
}

impl<'a> PersonaGenerator<'a> {
    pub fn new(catalog: &'a TagCatalog, settings: GeneratorSettings) -> Self {
        let defaults = GeneratorSettings::default();
        let settings = GeneratorSettings {
            max_tokens: settings.max_tokens.max(1),
            hair_drop_length_probability: probability_or(
                settings.hair_drop_length_probability,
                defaults.hair_drop_length_probability,
            ),
            expression_positive_bias: probability_or(
                settings.expression_positive_bias,
                defaults.expression_positive_bias,
            ),
            ..settings
        };
        PersonaGenerator { catalog, settings }
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        slots: &[Slot],
        locked: &[Tag],
        rng: &mut R,
    ) -> GenerationReport {
        let seeded = RunState::seeded(locked, slots);
        let mut state = slots
            .iter()
            .fold(seeded, |state, slot| self.fill_slot(state, slot, &mut *rng));

        self.enforce_hair_exclusivity(&mut state, rng);

        let new_tags = state.picks.iter().filter(|pick| !pick.locked).count();
        let mut tags: Vec<Tag> = state.picks.into_iter().map(|pick| pick.tag).collect();
        let mut truncated = 0;
        if tags.len() > self.settings.max_tokens {
            truncated = tags.len() - self.settings.max_tokens;
            warn!(
                "Random persona exceeded the budget of {}; truncating {} tag(s)",
                self.settings.max_tokens, truncated
            );
            tags.truncate(self.settings.max_tokens);
        }

        info!(
            "Generated persona with {} tag(s) ({} new, {} empty slot(s))",
            tags.len(),
            new_tags,
            state.empty_slots.len()
        );

        GenerationReport {
            tags,
            new_tags: new_tags.saturating_sub(truncated),
            empty_slots: state.empty_slots,
            truncated,
        }
    }

    fn fill_slot<R: Rng + ?Sized>(&self, mut state: RunState, slot: &Slot, rng: &mut R) -> RunState {
        if state.covers(slot) {
            debug!("Slot {} covered by a locked tag", slot.label());
            return state;
        }

        let Some(category) = self.catalog.category(&slot.category_id) else {
            if slot.required {
                state.record_empty(slot, "category not in catalog");
            }
            return state;
        };
        if !category.is_randomizable(self.settings.include_nsfw) {
            if slot.required {
                state.record_empty(slot, "category is not eligible for random generation");
            }
            return state;
        }

        let mut pool: Vec<Tag> = self
            .catalog
            .tags_in(&slot.category_id, slot.sub_category_id.as_deref())
            .into_iter()
            .filter(|candidate| !state.holds(candidate))
            .filter(|candidate| self.consistent(&state, slot.role, candidate))
            .cloned()
            .collect();

        if pool.is_empty() {
            if slot.required {
                state.record_empty(slot, "no eligible candidates after filtering");
            }
            return state;
        }

        for _ in 0..slot.count {
            if pool.is_empty() {
                break;
            }
            if state.picks.len() >= self.settings.max_tokens && !slot.required {
                debug!("Skipping optional slot {} at the tag budget", slot.label());
                break;
            }

            let index = self.choose_index(slot.role, &pool, rng);
            let chosen = if category.allow_multiple_selections {
                pool[index].instantiate()
            } else {
                let chosen = pool.remove(index);
                if chosen.is_exclusive() {
                    pool.retain(|other| other.slot_key() != chosen.slot_key());
                }
                chosen
            };
            debug!("Slot {} picked {}", slot.label(), chosen.name);
            state.picks.push(Pick {
                role: slot.role,
                tag: chosen,
                locked: false,
            });
        }
        state
    }

    fn consistent(&self, state: &RunState, role: SlotRole, candidate: &Tag) -> bool {
        match role {
            SlotRole::Age => state
                .implied_gender(SlotRole::Gender)
                .map_or(true, |gender| !contradicts_gender(&candidate.name, gender)),
            SlotRole::Gender => state
                .implied_gender(SlotRole::Age)
                .map_or(true, |gender| !contradicts_gender(&candidate.name, gender)),
            SlotRole::HairStyle => !state
                .names_with_role(SlotRole::HairLength)
                .any(|length| hair_conflict(length, &candidate.name)),
            SlotRole::HairLength => !state
                .names_with_role(SlotRole::HairStyle)
                .any(|style| hair_conflict(&candidate.name, style)),
            SlotRole::Expression | SlotRole::Other => true,
        }
    }

    fn choose_index<R: Rng + ?Sized>(&self, role: SlotRole, pool: &[Tag], rng: &mut R) -> usize {
        if role == SlotRole::Expression {
            let (positive, other): (Vec<usize>, Vec<usize>) =
                (0..pool.len()).partition(|&index| is_positive_expression(&pool[index].name));
            if !positive.is_empty() && !other.is_empty() {
                let subset = if rng.gen_bool(self.settings.expression_positive_bias) {
                    &positive
                } else {
                    &other
                };
                return subset[rng.gen_range(0..subset.len())];
            }
        }
        rng.gen_range(0..pool.len())
    }

    // Length and style are alternative hair descriptions; keep one when both were drawn.
    fn enforce_hair_exclusivity<R: Rng + ?Sized>(&self, state: &mut RunState, rng: &mut R) {
        let fresh = |role: SlotRole| {
            state
                .picks
                .iter()
                .any(|pick| !pick.locked && pick.role == role)
        };
        if !(fresh(SlotRole::HairLength) && fresh(SlotRole::HairStyle)) {
            return;
        }
        let dropped = if rng.gen_bool(self.settings.hair_drop_length_probability) {
            SlotRole::HairLength
        } else {
            SlotRole::HairStyle
        };
        debug!("Dropping generated {:?} tag to keep one hair descriptor", dropped);
        state
            .picks
            .retain(|pick| pick.locked || pick.role != dropped);
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::catalog::test_fixtures::sample_catalog;

    fn persona_slots() -> Vec<Slot> {
        vec![
            Slot::new("character", Some("gender")).required().with_role(SlotRole::Gender),
            Slot::new("character", Some("age")).required().with_role(SlotRole::Age),
            Slot::new("hair", Some("hair-length")).with_role(SlotRole::HairLength),
            Slot::new("hair", Some("hair-style")).with_role(SlotRole::HairStyle),
            Slot::new("hair", Some("hair-color")),
            Slot::new("expression", None).required().with_role(SlotRole::Expression),
            Slot::new("clothing", None).required(),
        ]
    }

    fn has_slot(tags: &[Tag], category: &str, sub: Option<&str>) -> bool {
        tags.iter()
            .any(|tag| tag.category_id == category && tag.sub_category_id.as_deref() == sub)
    }

    #[test]
    fn nan_probabilities_fall_back_to_defaults() {
        let catalog = sample_catalog();
        let settings = GeneratorSettings {
            hair_drop_length_probability: f64::NAN,
            expression_positive_bias: f64::NAN,
            ..GeneratorSettings::default()
        };
        let generator = PersonaGenerator::new(&catalog, settings);
        assert_eq!(generator.settings.hair_drop_length_probability, 0.5);
        assert_eq!(generator.settings.expression_positive_bias, 0.7);

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            let report = generator.generate(&persona_slots(), &[], &mut rng);
            assert!(has_slot(&report.tags, "expression", None));
        }
    }

    #[test]
    fn required_slots_fill_in_nearly_every_run() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let slots = persona_slots();

        let mut filled = vec![0usize; slots.len()];
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let report = generator.generate(&slots, &[], &mut rng);
            assert!(report.empty_slots.is_empty());
            for (index, slot) in slots.iter().enumerate() {
                if report
                    .tags
                    .iter()
                    .any(|tag| slot.targets(&tag.category_id, tag.sub_category_id.as_deref()))
                {
                    filled[index] += 1;
                }
            }
        }
        for (slot, count) in slots.iter().zip(filled) {
            if slot.required {
                assert!(count >= 95, "slot {} filled only {count} times", slot.label());
            }
        }
    }

    #[test]
    fn generated_hair_never_keeps_both_length_and_style() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let slots = persona_slots();
        let mut saw_length = false;
        let mut saw_style = false;
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let tags = generator.generate(&slots, &[], &mut rng).tags;
            let length = has_slot(&tags, "hair", Some("hair-length"));
            let style = has_slot(&tags, "hair", Some("hair-style"));
            assert!(!(length && style), "seed {seed} kept both hair descriptors");
            saw_length |= length;
            saw_style |= style;
        }
        assert!(saw_length && saw_style);
    }

    #[test]
    fn locked_hair_length_may_coexist_with_a_generated_style() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let slots = vec![
            Slot::new("hair", Some("hair-length")).with_role(SlotRole::HairLength),
            Slot::new("hair", Some("hair-style")).required().with_role(SlotRole::HairStyle),
        ];
        let locked = vec![catalog.tag("hair-long").cloned().unwrap().with_locked(true)];
        let mut rng = StdRng::seed_from_u64(7);
        let report = generator.generate(&slots, &locked, &mut rng);
        assert_eq!(report.tags[0].id, "hair-long");
        assert!(report.tags[0].is_locked);
        assert!(has_slot(&report.tags, "hair", Some("hair-style")));
        assert_eq!(report.new_tags, 1);
    }

    #[test]
    fn locked_tags_lead_and_covered_slots_are_skipped() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let locked = vec![catalog.tag("g-boy").cloned().unwrap().with_locked(true)];
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let tags = generator.generate(&persona_slots(), &locked, &mut rng).tags;
            assert_eq!(tags[0].id, "g-boy");
            let genders = tags
                .iter()
                .filter(|tag| tag.sub_category_id.as_deref() == Some("gender"))
                .count();
            assert_eq!(genders, 1);
        }
    }

    #[test]
    fn age_never_contradicts_the_chosen_gender() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let tags = generator.generate(&persona_slots(), &[], &mut rng).tags;
            let gender = tags
                .iter()
                .find(|tag| tag.sub_category_id.as_deref() == Some("gender"))
                .and_then(|tag| classify_gender(&tag.name))
                .unwrap();
            let age = tags
                .iter()
                .find(|tag| tag.sub_category_id.as_deref() == Some("age"))
                .unwrap();
            assert!(!contradicts_gender(&age.name, gender), "seed {seed}: {}", age.name);
        }
    }

    #[test]
    fn very_short_hair_excludes_braid_family_styles() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let slots = vec![
            Slot::new("hair", Some("hair-length")).with_role(SlotRole::HairLength),
            Slot::new("hair", Some("hair-style")).required().with_role(SlotRole::HairStyle),
        ];
        let locked = vec![catalog.tag("hair-very-short").cloned().unwrap().with_locked(true)];
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let report = generator.generate(&slots, &locked, &mut rng);
            let style = report
                .tags
                .iter()
                .find(|tag| tag.sub_category_id.as_deref() == Some("hair-style"))
                .unwrap();
            assert_eq!(style.name, "wavy hair");
        }
    }

    #[test]
    fn empty_required_slots_are_recorded_without_aborting() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let slots = vec![
            Slot::new("nsfw", None).required(),
            Slot::new("missing", None).required(),
            Slot::new("custom", None).required(),
            Slot::new("expression", None).required().with_role(SlotRole::Expression),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        let report = generator.generate(&slots, &[], &mut rng);
        assert_eq!(report.empty_slots.len(), 3);
        assert_eq!(report.new_tags, 1);
        assert!(report.warning().is_none());
    }

    #[test]
    fn aggregate_warning_when_nothing_was_generated() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let slots = vec![Slot::new("nsfw", None).required()];
        let mut rng = StdRng::seed_from_u64(1);
        let report = generator.generate(&slots, &[], &mut rng);
        assert!(report.tags.is_empty());
        assert!(report.warning().unwrap().contains("nsfw"));
    }

    #[test]
    fn multi_pick_slots_never_repeat_an_exclusive_answer() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let slots = vec![Slot::new("clothing", None).with_count(3)];
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let tags = generator.generate(&slots, &[], &mut rng).tags;
            // two subcategories, one tag each
            assert_eq!(tags.len(), 2);
            assert_ne!(tags[0].sub_category_id, tags[1].sub_category_id);
        }
    }

    #[test]
    fn multiple_selection_categories_yield_distinct_instances() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let slots = vec![Slot::new("modifier", None).with_count(3)];
        let mut rng = StdRng::seed_from_u64(3);
        let tags = generator.generate(&slots, &[], &mut rng).tags;
        assert_eq!(tags.len(), 3);
        assert!(tags.iter().all(|tag| tag.original_id.is_some()));
        assert_ne!(tags[0].id, tags[1].id);
    }

    #[test]
    fn optional_slots_stop_at_budget_and_required_overflow_is_truncated() {
        let catalog = sample_catalog();
        let settings = GeneratorSettings {
            max_tokens: 2,
            ..GeneratorSettings::default()
        };
        let generator = PersonaGenerator::new(&catalog, settings);
        let locked = vec![
            catalog.tag("g-girl").cloned().unwrap().with_locked(true),
            catalog.tag("color-red").cloned().unwrap().with_locked(true),
        ];

        let optional = vec![Slot::new("expression", None)];
        let mut rng = StdRng::seed_from_u64(5);
        let report = generator.generate(&optional, &locked, &mut rng);
        assert_eq!(report.tags.len(), 2);
        assert!(!report.budget_exceeded());

        let required = vec![Slot::new("expression", None).required()];
        let report = generator.generate(&required, &locked, &mut rng);
        assert_eq!(report.tags.len(), 2);
        assert!(report.budget_exceeded());
        assert!(report.tags.iter().all(|tag| tag.is_locked));
        assert_eq!(report.new_tags, 0);
    }

    #[test]
    fn expression_bias_extremes_pick_the_matching_subset() {
        let catalog = sample_catalog();
        let slots = vec![Slot::new("expression", None).with_role(SlotRole::Expression)];
        for (bias, positive) in [(1.0, true), (0.0, false)] {
            let settings = GeneratorSettings {
                expression_positive_bias: bias,
                ..GeneratorSettings::default()
            };
            let generator = PersonaGenerator::new(&catalog, settings);
            for seed in 0..50 {
                let mut rng = StdRng::seed_from_u64(seed);
                let tags = generator.generate(&slots, &[], &mut rng).tags;
                assert_eq!(is_positive_expression(&tags[0].name), positive);
            }
        }
    }

    #[test]
    fn same_seed_reproduces_the_same_persona() {
        let catalog = sample_catalog();
        let generator = PersonaGenerator::new(&catalog, GeneratorSettings::default());
        let ids = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            generator
                .generate(&persona_slots(), &[], &mut rng)
                .tags
                .into_iter()
                .map(|tag| tag.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(11), ids(11));
    }
}
