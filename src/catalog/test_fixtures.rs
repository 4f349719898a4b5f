use crate::catalog::types::{Category, SubCategory, Tag, TagCatalog};

fn tag(id: &str, name: &str, localized: &str, category: &Category, sub: Option<&str>) -> Tag {
    let mut tag = Tag::new(id, name, category.id.clone(), sub);
    tag.localized_name = localized.to_string();
    tag.allow_multiple_selections = category.allow_multiple_selections;
    tag.is_custom = category.is_input_category;
    tag
}

fn category(id: &str, name: &str) -> Category {
    Category {
        id: id.to_string(),
        name: name.to_string(),
        localized_name: name.to_string(),
        color: String::new(),
        tags: Vec::new(),
        sub_categories: Vec::new(),
        is_input_category: false,
        allow_multiple_selections: false,
        nsfw: false,
    }
}

fn sub(category: &Category, id: &str, name: &str, tags: &[(&str, &str, &str)]) -> SubCategory {
    SubCategory {
        id: id.to_string(),
        name: name.to_string(),
        localized_name: name.to_string(),
        tags: tags
            .iter()
            .map(|(tag_id, tag_name, localized)| tag(tag_id, tag_name, localized, category, Some(id)))
            .collect(),
    }
}

fn flat(category: &Category, tags: &[(&str, &str, &str)]) -> Vec<Tag> {
    tags.iter()
        .map(|(tag_id, tag_name, localized)| tag(tag_id, tag_name, localized, category, None))
        .collect()
}

/// Small taxonomy covering every rule the engine applies.
pub(crate) fn sample_catalog() -> TagCatalog {
    let mut character = category("character", "Character");
    character.sub_categories = vec![
        sub(
            &character,
            "gender",
            "Gender",
            &[("g-girl", "1girl", "女孩"), ("g-boy", "1boy", "男孩")],
        ),
        sub(
            &character,
            "age",
            "Age",
            &[
                ("age-young-woman", "young woman", "年轻女性"),
                ("age-elderly-woman", "elderly woman", "老年女性"),
                ("age-young-man", "young man", "年轻男性"),
                ("age-old-man", "old man", "老年男性"),
                ("age-adult", "adult", "成年"),
            ],
        ),
    ];

    let mut hair = category("hair", "Hair");
    hair.sub_categories = vec![
        sub(
            &hair,
            "hair-length",
            "Length",
            &[
                ("hair-long", "long hair", "长发"),
                ("hair-short", "short hair", "短发"),
                ("hair-very-short", "very short hair", "超短发"),
            ],
        ),
        sub(
            &hair,
            "hair-style",
            "Style",
            &[
                ("style-braid", "braid", "辫子"),
                ("style-twin-braids", "twin braids", "双辫"),
                ("style-ponytail", "ponytail", "马尾"),
                ("style-wavy", "wavy hair", "波浪发"),
            ],
        ),
        sub(
            &hair,
            "hair-color",
            "Color",
            &[("color-red", "red hair", "红发"), ("color-black", "black hair", "黑发")],
        ),
    ];

    let mut expression = category("expression", "Expression");
    expression.tags = flat(
        &expression,
        &[
            ("expr-smile", "smile", "微笑"),
            ("expr-laughing", "laughing", "大笑"),
            ("expr-sad", "sad", "悲伤"),
            ("expr-crying", "crying", "哭泣"),
        ],
    );

    let mut clothing = category("clothing", "Clothing");
    clothing.sub_categories = vec![
        sub(&clothing, "tops", "Tops", &[("top-shirt", "shirt", "衬衫"), ("top-sweater", "sweater", "毛衣")]),
        sub(&clothing, "dresses", "Dresses", &[("dress", "dress", "连衣裙"), ("dress-gown", "gown", "礼服")]),
    ];

    let mut modifier = category("modifier", "Modifier");
    modifier.allow_multiple_selections = true;
    modifier.tags = flat(&modifier, &[("mod-red", "red-", "红色"), ("mod-big", "big-", "大")]);

    let mut custom = category("custom", "Custom");
    custom.is_input_category = true;
    custom.allow_multiple_selections = true;

    let mut adult = category("nsfw", "Restricted");
    adult.nsfw = true;
    adult.tags = flat(&adult, &[("nsfw-1", "restricted pose", "限制")]);

    TagCatalog::new(vec![character, hair, expression, clothing, modifier, custom, adult])
}
