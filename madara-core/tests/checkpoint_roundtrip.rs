//! `save_context`/`save_checkpoint` -> binary encode -> `load_context`
//! round-trips, plus the `CheckpointSettings` filtering knobs (spec §6).

use madara_core::checkpoint::{read_checkpoint, write_checkpoint, CheckpointSettings, CheckpointWriter};
use madara_core::context::settings::KnowledgeUpdateSettings;
use madara_core::filters::FilterChain;
use madara_core::{Context, Record};

#[test]
fn full_context_round_trips_through_a_fresh_context_with_identical_rendering() {
    let source = Context::new("agent-a");
    source.set("alpha", Record::integer(1), &KnowledgeUpdateSettings::default());
    source.set("beta", Record::double(2.5), &KnowledgeUpdateSettings::default());
    source.set("gamma", Record::string("hello"), &KnowledgeUpdateSettings::default());

    let mut writer = CheckpointWriter::new();
    let state = writer.save_context(&source, &[]);
    let bytes = write_checkpoint("agent-a", "", std::slice::from_ref(&state));
    let (_header, states) = read_checkpoint(&bytes).unwrap();

    let dest = Context::new("agent-b");
    let filters = FilterChain::new();
    let applied = madara_core::checkpoint::load_context(&dest, &states, &CheckpointSettings::default(), &filters);
    assert_eq!(applied, 3);

    for name in ["alpha", "beta", "gamma"] {
        assert_eq!(source.get(name).to_string(), dest.get(name).to_string());
    }
}

#[test]
fn prefix_filter_only_loads_matching_names() {
    let source = Context::new("agent-a");
    source.set("robot.x", Record::integer(1), &KnowledgeUpdateSettings::default());
    source.set("robot.y", Record::integer(2), &KnowledgeUpdateSettings::default());
    source.set("sensor.temp", Record::integer(99), &KnowledgeUpdateSettings::default());

    let mut writer = CheckpointWriter::new();
    let state = writer.save_context(&source, &[]);
    let bytes = write_checkpoint("agent-a", "", std::slice::from_ref(&state));
    let (_header, states) = read_checkpoint(&bytes).unwrap();

    let dest = Context::new("agent-b");
    let filters = FilterChain::new();
    let settings = CheckpointSettings {
        prefixes: vec!["robot.".to_string()],
        ..Default::default()
    };
    let applied = madara_core::checkpoint::load_context(&dest, &states, &settings, &filters);
    assert_eq!(applied, 2);
    assert!(!dest.exists("sensor.temp"));
    assert_eq!(dest.get("robot.x").to_integer(), 1);
    assert_eq!(dest.get("robot.y").to_integer(), 2);
}

#[test]
fn override_lamport_and_timestamp_stamp_every_loaded_record() {
    let source = Context::new("agent-a");
    source.set("x", Record::integer(5), &KnowledgeUpdateSettings::default());

    let mut writer = CheckpointWriter::new();
    let state = writer.save_context(&source, &[]);
    let bytes = write_checkpoint("agent-a", "", std::slice::from_ref(&state));
    let (_header, states) = read_checkpoint(&bytes).unwrap();

    let dest = Context::new("agent-b");
    let filters = FilterChain::new();
    let settings = CheckpointSettings {
        override_lamport: Some(777),
        override_timestamp: Some(12345),
        ..Default::default()
    };
    madara_core::checkpoint::load_context(&dest, &states, &settings, &filters);
    let loaded = dest.get("x");
    assert_eq!(loaded.clock, 777);
    assert_eq!(loaded.toi, 12345);
}

#[test]
fn states_range_limits_which_checkpoint_slices_are_replayed() {
    let ctx = Context::new("agent-a");
    let mut writer = CheckpointWriter::new();

    ctx.set("x", Record::integer(1), &KnowledgeUpdateSettings::default());
    let s1 = writer.save_checkpoint(&ctx, &[]);
    ctx.set("y", Record::integer(2), &KnowledgeUpdateSettings::default());
    let s2 = writer.save_checkpoint(&ctx, &[]);

    let states = vec![s1, s2];
    let dest = Context::new("agent-b");
    let filters = FilterChain::new();
    let settings = CheckpointSettings {
        states: Some((0, 1)),
        ..Default::default()
    };
    let applied = madara_core::checkpoint::load_context(&dest, &states, &settings, &filters);
    assert_eq!(applied, 1);
    assert!(dest.exists("x"));
    assert!(!dest.exists("y"));
}

#[test]
fn incremental_save_then_load_reconstructs_the_final_value_across_multiple_checkpoints() {
    let ctx = Context::new("agent-a");
    let mut writer = CheckpointWriter::new();

    ctx.set("counter", Record::integer(1), &KnowledgeUpdateSettings::default());
    let s1 = writer.save_checkpoint(&ctx, &[]);
    ctx.set("counter", Record::integer(2), &KnowledgeUpdateSettings::default());
    let s2 = writer.save_checkpoint(&ctx, &[]);
    ctx.set("counter", Record::integer(3), &KnowledgeUpdateSettings::default());
    let s3 = writer.save_checkpoint(&ctx, &[]);

    let states = [s1, s2, s3];
    let bytes = write_checkpoint("agent-a", "", &states);
    let (_header, decoded) = read_checkpoint(&bytes).unwrap();

    let dest = Context::new("agent-b");
    let filters = FilterChain::new();
    madara_core::checkpoint::load_context(&dest, &decoded, &CheckpointSettings::default(), &filters);
    assert_eq!(dest.get("counter").to_integer(), 3);
}
