//! Integration tests for the sequencer modules.
//!
//! Modules are constructed through the public constructor registry, driven by
//! JSON params, and read back through their output ports — the same surface a
//! host uses.

use gridseq_core::dsp::get_constructors;
use gridseq_core::patch::Patch;
use gridseq_core::types::{ClockMessages, Message, Sampleable, SampleableMap};
use serde_json::json;
use std::sync::Arc;

const SAMPLE_RATE: f32 = 44100.0;

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Create a named module from the constructor registry.
fn make_module(module_type: &str, id: &str) -> Arc<Box<dyn Sampleable>> {
    let constructors = get_constructors();
    constructors
        .get(module_type)
        .unwrap_or_else(|| panic!("no constructor for '{module_type}'"))(&id.to_string(), SAMPLE_RATE)
    .unwrap_or_else(|e| panic!("constructor for '{module_type}' failed: {e}"))
}

/// Set params on a module (JSON → try_update_params).
fn set_params(module: &dyn Sampleable, params: serde_json::Value) {
    module
        .try_update_params(params)
        .expect("try_update_params failed");
}

/// Advance one sample: tick then update.
fn step(module: &dyn Sampleable) {
    module.tick();
    module.update();
}

fn get(module: &dyn Sampleable, port: &str) -> f32 {
    module
        .get_sample(&port.to_string())
        .expect("get_sample failed")
}

/// Override the clock field of a params object.
fn with_clock(mut params: serde_json::Value, volts: f32) -> serde_json::Value {
    params["clock"] = json!(volts);
    params
}

/// Burn through the startup guard with the clock low.
fn warm_up(module: &dyn Sampleable, params: &serde_json::Value) {
    set_params(module, with_clock(params.clone(), 0.0));
    for _ in 0..24 {
        step(module);
    }
}

/// One full clock pulse: a high sample then a low sample.
fn pulse(module: &dyn Sampleable, params: &serde_json::Value) {
    set_params(module, with_clock(params.clone(), 5.0));
    step(module);
    set_params(module, with_clock(params.clone(), 0.0));
    step(module);
}

// ─── stepSeq ─────────────────────────────────────────────────────────────────

#[test]
fn step_seq_walks_forward_and_wraps() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({
        "steps": 8,
        "stepModes": [1, 1, 1, 1, 1, 1, 1, 1],
        "stepCvs": [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
    });
    warm_up(&**seq, &params);

    for expected in 1..=8 {
        pulse(&**seq, &params);
        assert_eq!(get(&**seq, "position"), expected as f32);
        assert_eq!(get(&**seq, "gate"), 5.0);
        assert_eq!(get(&**seq, "gateInv"), 0.0);
        assert_eq!(get(&**seq, "cv"), expected as f32);
        assert_eq!(get(&**seq, "cvInv"), -(expected as f32));
    }
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 1.0, "wraps to 1, not 9 or 0");
}

#[test]
fn step_seq_startup_guard_swallows_early_clocks() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({ "steps": 8, "stepModes": [1] });
    // Clock edges inside the guard window must not advance anything.
    for _ in 0..6 {
        set_params(&**seq, with_clock(params.clone(), 5.0));
        step(&**seq);
        set_params(&**seq, with_clock(params.clone(), 0.0));
        step(&**seq);
    }
    assert_eq!(get(&**seq, "position"), 0.0);
}

#[test]
fn step_seq_off_steps_keep_gate_low() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({
        "steps": 8,
        "length": 2.0,
        "stepModes": [1, 0],
    });
    warm_up(&**seq, &params);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "gate"), 5.0);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "gate"), 0.0);
    assert_eq!(get(&**seq, "gateInv"), 5.0);
}

#[test]
fn step_seq_trigger_step_fires_pulse_not_gate() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({
        "steps": 8,
        "length": 1.0,
        "stepModes": [2],
    });
    warm_up(&**seq, &params);
    pulse(&**seq, &params);
    // The trig pulse is 1 ms wide; both samples of the pulse land inside it.
    assert_eq!(get(&**seq, "gate"), 0.0);
    // Pulse fired on the clock-high sample; run past its width and confirm it ends.
    set_params(&**seq, with_clock(params.clone(), 0.0));
    for _ in 0..60 {
        step(&**seq);
    }
    assert_eq!(get(&**seq, "trig"), 0.0);
}

#[test]
fn step_seq_one_shot_ends_and_resets() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({
        "steps": 8,
        "length": 4.0,
        "direction": 5.0,
        "stepModes": [1, 1, 1, 1],
    });
    warm_up(&**seq, &params);
    for _ in 0..4 {
        pulse(&**seq, &params);
    }
    assert_eq!(get(&**seq, "position"), 4.0);
    assert_eq!(get(&**seq, "ended"), 0.0);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 0.0);
    assert_eq!(get(&**seq, "ended"), 5.0);
    // Frozen until reset.
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 0.0);
    assert_eq!(get(&**seq, "ended"), 5.0);

    let mut reset_params = params.clone();
    reset_params["reset"] = json!(5.0);
    set_params(&**seq, reset_params);
    step(&**seq);
    set_params(&**seq, params.clone());
    step(&**seq);
    assert_eq!(get(&**seq, "ended"), 0.0);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 1.0);
}

#[test]
fn step_seq_reset_held_pins_position() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({ "steps": 8, "stepModes": [1, 1, 1] });
    warm_up(&**seq, &params);
    pulse(&**seq, &params);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 2.0);

    let mut held = params.clone();
    held["reset"] = json!(10.0);
    for _ in 0..4 {
        set_params(&**seq, with_clock(held.clone(), 5.0));
        step(&**seq);
        set_params(&**seq, with_clock(held.clone(), 0.0));
        step(&**seq);
        assert_eq!(get(&**seq, "position"), 0.0);
    }
    set_params(&**seq, params.clone());
    step(&**seq);
    assert_eq!(get(&**seq, "position"), 0.0, "release alone does not advance");
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 1.0);
}

#[test]
fn step_seq_addressed_mode_tracks_address() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({
        "steps": 8,
        "direction": 4.0,
        "address": 0.0,
    });
    warm_up(&**seq, &params);
    step(&**seq);
    assert_eq!(get(&**seq, "position"), 1.0);

    let mut high = params.clone();
    high["address"] = json!(10.0);
    set_params(&**seq, high.clone());
    step(&**seq);
    assert_eq!(get(&**seq, "position"), 8.0);

    // Attenuation scales the address before mapping.
    let mut half = params.clone();
    half["address"] = json!(10.0);
    half["addressAttenuation"] = json!(0.5);
    set_params(&**seq, half);
    step(&**seq);
    assert_eq!(get(&**seq, "position"), 5.0);
}

#[test]
fn step_seq_hold_on_gate_latches_on_rising_edge() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({
        "steps": 8,
        "length": 3.0,
        "holdMode": 2,
        "stepModes": [1, 0, 1],
        "stepCvs": [2.0, 9.0, 4.0],
    });
    warm_up(&**seq, &params);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "cv"), 2.0, "gate step latches on entry");
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "cv"), 2.0, "off step holds the latched value");
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "cv"), 4.0, "next gate rising edge latches again");
}

#[test]
fn step_seq_run_low_ignores_clock() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({ "steps": 8, "run": 0.0, "stepModes": [1] });
    warm_up(&**seq, &params);
    for _ in 0..3 {
        pulse(&**seq, &params);
    }
    assert_eq!(get(&**seq, "position"), 0.0);
}

#[test]
fn step_seq_range_scales_cv() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({
        "steps": 8,
        "length": 1.0,
        "stepModes": [1],
        "stepCvs": [2.0],
        "range": 2.5,
    });
    warm_up(&**seq, &params);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "cv"), 5.0);
    assert_eq!(get(&**seq, "cvInv"), -5.0);
}

#[test]
fn step_seq_transport_messages() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({ "steps": 8, "stepModes": [1, 1, 1] });
    warm_up(&**seq, &params);
    pulse(&**seq, &params);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 2.0);

    seq.handle_message(&Message::Clock(ClockMessages::Stop))
        .unwrap();
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 2.0, "stopped transport ignores clocks");

    seq.handle_message(&Message::Clock(ClockMessages::Start))
        .unwrap();
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 1.0, "start rewinds to the origin");
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[test]
fn step_seq_state_round_trip() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({ "steps": 8, "stepModes": [1, 1, 1, 1] });
    warm_up(&**seq, &params);
    for _ in 0..3 {
        pulse(&**seq, &params);
    }
    let state = seq.get_state().expect("stateful module must expose state");

    let restored = make_module("stepSeq", "seq-2");
    restored.load_state(state).unwrap();
    warm_up(&**restored, &params);
    pulse(&**restored, &params);
    assert_eq!(get(&**restored, "position"), 4.0);
}

#[test]
fn step_seq_state_missing_fields_fall_back() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({ "steps": 8, "stepModes": [1] });
    seq.load_state(json!({ "position": 7 })).unwrap();
    warm_up(&**seq, &params);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 8.0);
}

#[test]
fn step_seq_malformed_state_is_ignored() {
    let seq = make_module("stepSeq", "seq-1");
    let params = json!({ "steps": 8, "stepModes": [1] });
    seq.load_state(json!("not an object")).unwrap();
    warm_up(&**seq, &params);
    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 1.0);
}

// ─── gateSeq ─────────────────────────────────────────────────────────────────

#[test]
fn gate_seq_rows_follow_their_cells() {
    let seq = make_module("gateSeq", "gseq-1");
    let params = json!({
        "steps": 8,
        "length": 2.0,
        "rows": [
            [true, false],
            [false, true],
            [true, true],
            [false, false],
        ],
    });
    warm_up(&**seq, &params);

    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 1.0);
    assert_eq!(get(&**seq, "gate1"), 5.0);
    assert_eq!(get(&**seq, "gate2"), 0.0);
    assert_eq!(get(&**seq, "gate3"), 5.0);
    assert_eq!(get(&**seq, "gate4"), 0.0);

    pulse(&**seq, &params);
    assert_eq!(get(&**seq, "position"), 2.0);
    assert_eq!(get(&**seq, "gate1"), 0.0);
    assert_eq!(get(&**seq, "gate2"), 5.0);
    assert_eq!(get(&**seq, "gate3"), 5.0);
}

#[test]
fn gate_seq_trigger_fires_on_active_cells() {
    let seq = make_module("gateSeq", "gseq-1");
    let params = json!({
        "steps": 8,
        "length": 2.0,
        "rows": [[true, false]],
    });
    warm_up(&**seq, &params);
    set_params(&**seq, with_clock(params.clone(), 5.0));
    step(&**seq);
    assert_eq!(get(&**seq, "trig1"), 5.0);
    assert_eq!(get(&**seq, "trig2"), 0.0);
}

// ─── bitPattern ──────────────────────────────────────────────────────────────

#[test]
fn bit_pattern_all_dont_care_never_asserts() {
    let generator = make_module("bitPattern", "bits-1");
    let params = json!({ "bits": [0, 0, 0, 0] });
    set_params(&**generator, params.clone());
    for _ in 0..40 {
        pulse(&**generator, &params);
        assert_eq!(get(&**generator, "gate"), 0.0);
    }
}

#[test]
fn bit_pattern_matches_decided_bits() {
    let generator = make_module("bitPattern", "bits-1");
    // Match xx101 (bit0=1, bit1=0, bit2=1): counter values 5, 13, 21, ...
    let params = json!({ "bits": [1, -1, 1] });
    set_params(&**generator, params.clone());
    for count in 1..=13 {
        pulse(&**generator, &params);
        let expected = count & 0b111 == 0b101;
        assert_eq!(
            get(&**generator, "gate"),
            if expected { 5.0 } else { 0.0 },
            "counter value {count}"
        );
        assert_eq!(get(&**generator, "count"), count as f32);
    }
}

#[test]
fn bit_pattern_trigger_on_rising_match_only() {
    let generator = make_module("bitPattern", "bits-1");
    // Bit 1 high matches counter values 2 and 3 consecutively.
    let params = json!({ "bits": [0, 1] });
    set_params(&**generator, params.clone());
    pulse(&**generator, &params);
    assert_eq!(get(&**generator, "gate"), 0.0);
    set_params(&**generator, with_clock(params.clone(), 5.0));
    step(&**generator);
    assert_eq!(get(&**generator, "gate"), 5.0);
    assert_eq!(get(&**generator, "trig"), 5.0, "rising match fires the trigger");
    set_params(&**generator, with_clock(params.clone(), 0.0));
    for _ in 0..60 {
        step(&**generator);
    }
    // Counter still 2, gate held, trigger expired.
    assert_eq!(get(&**generator, "gate"), 5.0);
    assert_eq!(get(&**generator, "trig"), 0.0);
    // Counter 3 keeps the gate high with no second trigger.
    set_params(&**generator, with_clock(params.clone(), 5.0));
    step(&**generator);
    assert_eq!(get(&**generator, "gate"), 5.0);
    assert_eq!(get(&**generator, "trig"), 0.0);
}

#[test]
fn bit_pattern_reset_zeroes_counter() {
    let generator = make_module("bitPattern", "bits-1");
    let params = json!({ "bits": [1] });
    set_params(&**generator, params.clone());
    for _ in 0..5 {
        pulse(&**generator, &params);
    }
    assert_eq!(get(&**generator, "count"), 5.0);
    let mut reset = params.clone();
    reset["reset"] = json!(5.0);
    set_params(&**generator, reset);
    step(&**generator);
    assert_eq!(get(&**generator, "count"), 0.0);
}

// ─── srLatch ─────────────────────────────────────────────────────────────────

#[test]
fn sr_latch_set_reset_hold() {
    let latch = make_module("srLatch", "latch-1");
    set_params(&**latch, json!({ "set": 5.0 }));
    step(&**latch);
    assert_eq!(get(&**latch, "q"), 5.0);
    assert_eq!(get(&**latch, "qInv"), 0.0);

    set_params(&**latch, json!({}));
    step(&**latch);
    assert_eq!(get(&**latch, "q"), 5.0, "both low holds");

    set_params(&**latch, json!({ "reset": 5.0 }));
    step(&**latch);
    assert_eq!(get(&**latch, "q"), 0.0);
    assert_eq!(get(&**latch, "qInv"), 5.0);
}

#[test]
fn sr_latch_invalid_state_reports_both_high() {
    let latch = make_module("srLatch", "latch-1");
    set_params(&**latch, json!({ "set": 5.0, "reset": 5.0, "enable": 5.0 }));
    step(&**latch);
    assert_eq!(get(&**latch, "q"), 5.0);
    assert_eq!(get(&**latch, "qInv"), 5.0, "NOR race reported, not normalized");
}

#[test]
fn sr_latch_enable_low_freezes() {
    let latch = make_module("srLatch", "latch-1");
    set_params(&**latch, json!({ "set": 5.0 }));
    step(&**latch);
    assert_eq!(get(&**latch, "q"), 5.0);

    set_params(&**latch, json!({ "reset": 5.0, "enable": 0.0 }));
    step(&**latch);
    assert_eq!(get(&**latch, "q"), 5.0, "disabled latch ignores reset");
}

// ─── trigRows ────────────────────────────────────────────────────────────────

#[test]
fn trig_rows_dual_outputs_and_per_row_wrap() {
    let rows = make_module("trigRows", "rows-1");
    let params = json!({
        "lengths": [2, 3],
        "cells": [
            [3, 1],
            [2, 0, 1],
        ],
    });
    set_params(&**rows, params.clone());

    // Step 1: row 1 cell 3 → both, row 2 cell 2 → lower only.
    set_params(&**rows, with_clock(params.clone(), 5.0));
    step(&**rows);
    assert_eq!(get(&**rows, "upper1"), 5.0);
    assert_eq!(get(&**rows, "lower1"), 5.0);
    assert_eq!(get(&**rows, "upper2"), 0.0);
    assert_eq!(get(&**rows, "lower2"), 5.0);

    // Let the pulses expire before the next edge.
    set_params(&**rows, with_clock(params.clone(), 0.0));
    for _ in 0..60 {
        step(&**rows);
    }
    assert_eq!(get(&**rows, "upper1"), 0.0);
    assert_eq!(get(&**rows, "lower1"), 0.0);

    // Step 2: row 1 cell 1 → upper, row 2 cell 0 → nothing.
    set_params(&**rows, with_clock(params.clone(), 5.0));
    step(&**rows);
    assert_eq!(get(&**rows, "upper1"), 5.0);
    assert_eq!(get(&**rows, "lower1"), 0.0);
    assert_eq!(get(&**rows, "upper2"), 0.0);
    assert_eq!(get(&**rows, "lower2"), 0.0);

    set_params(&**rows, with_clock(params.clone(), 0.0));
    for _ in 0..60 {
        step(&**rows);
    }

    // Step 3: row 1 wrapped to cell 3 again, row 2 on cell 1 → upper.
    set_params(&**rows, with_clock(params.clone(), 5.0));
    step(&**rows);
    assert_eq!(get(&**rows, "upper1"), 5.0);
    assert_eq!(get(&**rows, "lower1"), 5.0);
    assert_eq!(get(&**rows, "upper2"), 5.0);
    assert_eq!(get(&**rows, "lower2"), 0.0);
}

// ─── Expansion chain ─────────────────────────────────────────────────────────

struct Chain {
    patch: Patch,
    master_params: serde_json::Value,
}

impl Chain {
    /// Master "seq-1" plus `expanders` channel modules "ch-1".."ch-N", each
    /// chained to the module on its left.
    fn new(expanders: usize) -> Self {
        let master_params = json!({
            "steps": 8,
            "stepModes": [1, 1, 1, 1, 1, 1, 1, 1],
            "stepCvs": [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        });

        let mut sampleables: SampleableMap = SampleableMap::new();
        let master = make_module("stepSeq", "seq-1");
        set_params(&**master, master_params.clone());
        sampleables.insert("seq-1".to_string(), master);

        for i in 1..=expanders {
            let id = format!("ch-{i}");
            let source = if i == 1 {
                "seq-1".to_string()
            } else {
                format!("ch-{}", i - 1)
            };
            let channel = make_module("seqChannel", &id);
            set_params(
                &**channel,
                json!({
                    "source": source,
                    "steps": 8,
                    "stepModes": [1, 1, 1, 1, 1, 1, 1, 1],
                    "stepCvs": [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
                }),
            );
            sampleables.insert(id, channel);
        }

        let mut patch = Patch::new(sampleables);
        patch.wire();
        Self {
            patch,
            master_params,
        }
    }

    fn frame(&self, clock: f32) {
        let master = self.patch.sampleables.get("seq-1").unwrap();
        set_params(&***master, with_clock(self.master_params.clone(), clock));
        self.patch.process_frame();
    }

    fn warm_up(&self) {
        for _ in 0..24 {
            self.frame(0.0);
        }
    }

    fn read(&self, id: &str, port: &str) -> f32 {
        self.patch
            .get_sample(&id.to_string(), &port.to_string())
            .expect("get_sample failed")
    }
}

#[test]
fn expander_sees_master_position_one_frame_late() {
    let chain = Chain::new(1);
    chain.warm_up();

    chain.frame(5.0);
    assert_eq!(chain.read("seq-1", "position"), 1.0);
    assert_eq!(
        chain.read("ch-1", "position"),
        0.0,
        "same-frame visibility would be a race"
    );

    chain.frame(0.0);
    assert_eq!(chain.read("ch-1", "position"), 1.0);

    chain.frame(5.0);
    assert_eq!(chain.read("seq-1", "position"), 2.0);
    assert_eq!(chain.read("ch-1", "position"), 1.0);
    chain.frame(0.0);
    assert_eq!(chain.read("ch-1", "position"), 2.0);
}

#[test]
fn expander_chain_self_numbers_round_robin() {
    let chain = Chain::new(8);
    chain.warm_up();
    // Give the chain enough frames for the slot numbering to ripple through.
    for _ in 0..12 {
        chain.frame(0.0);
    }
    for i in 1..=8 {
        let expected = if i >= 7 { i - 6 } else { i + 1 };
        assert_eq!(
            chain.read(&format!("ch-{i}"), "slot"),
            expected as f32,
            "expander {i} slot"
        );
    }
}

#[test]
fn expander_follows_shared_cells_when_selected() {
    let chain = Chain::new(1);
    chain.warm_up();
    chain.frame(5.0);
    chain.frame(0.0);
    // ch-1 sees position 1 now; its own step cells drive its outputs.
    assert_eq!(chain.read("ch-1", "gate"), 5.0);
    assert_eq!(chain.read("ch-1", "cv"), 1.0);
}

#[test]
fn expander_with_wrong_channel_stays_silent() {
    let chain = Chain::new(1);
    let ch = chain.patch.sampleables.get("ch-1").unwrap();
    set_params(
        &***ch,
        json!({
            "source": "seq-1",
            "channel": 5,
            "steps": 8,
            "stepModes": [1, 1, 1, 1, 1, 1, 1, 1],
        }),
    );
    chain.warm_up();
    chain.frame(5.0);
    chain.frame(0.0);
    assert_eq!(chain.read("ch-1", "gate"), 0.0);
    assert_eq!(chain.read("ch-1", "position"), 0.0);
}

#[test]
fn expander_step_count_mismatch_reads_neutral() {
    let mut sampleables: SampleableMap = SampleableMap::new();
    let master = make_module("stepSeq", "seq-1");
    set_params(&**master, json!({ "steps": 8, "stepModes": [1] }));
    sampleables.insert("seq-1".to_string(), master);
    let channel = make_module("seqChannel", "ch-1");
    set_params(
        &**channel,
        json!({ "source": "seq-1", "steps": 16, "stepModes": [1] }),
    );
    sampleables.insert("ch-1".to_string(), channel);

    let mut patch = Patch::new(sampleables);
    patch.wire();
    for _ in 0..30 {
        patch.process_frame();
    }
    // 8-step masters only chain with 8-step expanders.
    assert_eq!(
        patch
            .get_sample(&"ch-1".to_string(), &"slot".to_string())
            .unwrap(),
        0.0
    );
}

#[test]
fn single_step_loop_retriggers_chained_channel() {
    // Length 1 keeps the shared position parked on step 1, so the channel
    // must take its step cue from the chain message, not a position change.
    let master_params = json!({
        "steps": 8,
        "length": 1,
        "stepModes": [2, 0, 0, 0, 0, 0, 0, 0],
    });
    let mut sampleables: SampleableMap = SampleableMap::new();
    let master = make_module("stepSeq", "seq-1");
    set_params(&**master, master_params.clone());
    sampleables.insert("seq-1".to_string(), master);
    let channel = make_module("seqChannel", "ch-1");
    set_params(
        &**channel,
        json!({ "source": "seq-1", "steps": 8, "stepModes": [2, 0, 0, 0, 0, 0, 0, 0] }),
    );
    sampleables.insert("ch-1".to_string(), channel);

    let mut patch = Patch::new(sampleables);
    patch.wire();
    let patch = patch;

    let frame = |clock: f32| {
        let master = patch.sampleables.get("seq-1").unwrap();
        set_params(&***master, with_clock(master_params.clone(), clock));
        patch.process_frame();
    };
    let trig = |id: &str| {
        patch
            .get_sample(&id.to_string(), &"trig".to_string())
            .unwrap()
    };

    for _ in 0..24 {
        frame(0.0);
    }

    frame(5.0);
    assert_eq!(trig("seq-1"), 5.0);
    frame(0.0);
    assert_eq!(trig("ch-1"), 5.0);

    // Let both trigger pulses run out before the next clock.
    for _ in 0..60 {
        frame(0.0);
    }
    assert_eq!(trig("ch-1"), 0.0);

    frame(5.0);
    frame(0.0);
    assert_eq!(
        trig("ch-1"),
        5.0,
        "re-stepping onto the same position is still a step"
    );
}

#[test]
fn channel_cannot_chain_to_gate_rows() {
    let mut sampleables: SampleableMap = SampleableMap::new();
    let rows = make_module("gateSeq", "rows-1");
    set_params(
        &**rows,
        json!({ "steps": 8, "rows": [[true, true, true, true, true, true, true, true]] }),
    );
    sampleables.insert("rows-1".to_string(), rows);
    let channel = make_module("seqChannel", "ch-1");
    set_params(
        &**channel,
        json!({ "source": "rows-1", "steps": 8, "stepModes": [1, 1, 1, 1, 1, 1, 1, 1] }),
    );
    sampleables.insert("ch-1".to_string(), channel);

    let mut patch = Patch::new(sampleables);
    patch.wire();
    for _ in 0..30 {
        patch.process_frame();
    }
    // Gate rows carry no chain state; the channel stays unchained.
    let read = |port: &str| {
        patch
            .get_sample(&"ch-1".to_string(), &port.to_string())
            .unwrap()
    };
    assert_eq!(read("slot"), 0.0);
    assert_eq!(read("position"), 0.0);
    assert_eq!(read("gate"), 0.0);
}

#[test]
fn unchained_expander_outputs_rest_levels() {
    let channel = make_module("seqChannel", "ch-1");
    set_params(&**channel, json!({ "steps": 8, "stepModes": [1, 1] }));
    for _ in 0..10 {
        step(&**channel);
    }
    assert_eq!(get(&**channel, "gate"), 0.0);
    assert_eq!(get(&**channel, "position"), 0.0);
    assert_eq!(get(&**channel, "slot"), 0.0);
}

// ─── Registry / schema ───────────────────────────────────────────────────────

#[test]
fn registry_exposes_all_module_types() {
    let constructors = get_constructors();
    for ty in ["stepSeq", "gateSeq", "seqChannel", "bitPattern", "srLatch", "trigRows"] {
        assert!(constructors.contains_key(ty), "missing constructor: {ty}");
    }
    assert_eq!(gridseq_core::dsp::schema().len(), constructors.len());
}

#[test]
fn params_validators_accept_and_reject() {
    let validators = gridseq_core::dsp::get_param_validators();
    let validate = validators.get("stepSeq").expect("stepSeq validator");
    assert!(validate(&json!({ "range": 2.0, "stepModes": [0, 1, 2] })).is_ok());
    assert!(validate(&json!({ "range": "loud" })).is_err());
}
