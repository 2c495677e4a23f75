//! Property tests for configuration item text round-trips

use std::path::Path;

use proptest::prelude::*;
use remedy_core::{ConfigView, ConfigurationItem, Datatype, ItemValue, RuleConfig};

fn element() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_./:@+-]{1,12}"
}

fn reload(rule: &str, items: &[ConfigurationItem]) -> RuleConfig {
    let mut config = RuleConfig::new();
    config.record(rule, items);
    RuleConfig::parse(Path::new("remedy.conf"), &config.render(ConfigView::Full)).unwrap()
}

proptest! {
    #[test]
    fn list_values_survive_text_form(items in prop::collection::vec(element(), 0..8)) {
        let value = ItemValue::List(items.clone());
        let parsed = ItemValue::parse("USERS", Datatype::List, &value.to_text()).unwrap();
        prop_assert_eq!(parsed, ItemValue::List(items));
    }

    #[test]
    fn list_items_survive_config_file(items in prop::collection::vec(element(), 0..8)) {
        let mut item = ConfigurationItem::new("ALLOWUSERS", ItemValue::List(vec!["root".into()]), "");
        item.set_value(ItemValue::List(items.clone())).unwrap();

        let loaded = reload("SshUsers", std::slice::from_ref(&item));

        let mut fresh = vec![ConfigurationItem::new("ALLOWUSERS", ItemValue::List(vec!["root".into()]), "")];
        loaded.apply("SshUsers", &mut fresh).unwrap();
        prop_assert_eq!(fresh[0].value(), &ItemValue::List(items));
    }

    #[test]
    fn strings_survive_config_file(text in "([A-Za-z0-9_./:@+-][A-Za-z0-9 _./:@+-]{0,20}[A-Za-z0-9_./:@+-])?") {
        let mut item = ConfigurationItem::new("BANNER", ItemValue::Str("default".into()), "");
        item.set_value(ItemValue::Str(text.clone())).unwrap();
        let loaded = reload("Issue", &[item]);

        let mut fresh = vec![ConfigurationItem::new("BANNER", ItemValue::Str("default".into()), "")];
        loaded.apply("Issue", &mut fresh).unwrap();
        prop_assert_eq!(fresh[0].value(), &ItemValue::Str(text));
    }

    #[test]
    fn uc_prefixed_keys_keep_their_values(suffix in "[A-Z]{1,8}", a in element(), b in element()) {
        let prefixed = format!("UC{suffix}");
        let items = vec![
            ConfigurationItem::new(prefixed.clone(), ItemValue::Str(a.clone()), ""),
            ConfigurationItem::new(suffix.clone(), ItemValue::Str(b.clone()), ""),
        ];
        let loaded = reload("Masks", &items);

        let mut fresh = vec![
            ConfigurationItem::new(prefixed, ItemValue::Str(String::new()), ""),
            ConfigurationItem::new(suffix, ItemValue::Str(String::new()), ""),
        ];
        loaded.apply("Masks", &mut fresh).unwrap();
        prop_assert_eq!(fresh[0].value(), &ItemValue::Str(a));
        prop_assert_eq!(fresh[1].value(), &ItemValue::Str(b));
        prop_assert_eq!(fresh[1].user_comment.as_str(), "");
    }

    #[test]
    fn integers_survive_text_form(n in any::<i64>()) {
        let parsed = ItemValue::parse("MAXTRIES", Datatype::Int, &ItemValue::Int(n).to_text()).unwrap();
        prop_assert_eq!(parsed, ItemValue::Int(n));
    }
}
