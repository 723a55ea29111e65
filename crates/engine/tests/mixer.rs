//! Mix graph behavior over a scripted graph backend.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use recast_common::RecastError;
use recast_engine::{AudioMixGraph, MediaTrack, PlatformClass};

use common::{MockGraphFactory, MockTrack};

fn audio_track(id: &str) -> Arc<dyn MediaTrack> {
    Arc::new(MockTrack::audio(id))
}

#[test]
fn single_input_passes_through_untouched() {
    let factory = MockGraphFactory::new();
    let system = audio_track("system");

    let output =
        AudioMixGraph::mix(&factory, PlatformClass::Default, Some(&system), None).unwrap();

    // Identity: the very same track comes back, no graph is built.
    assert!(Arc::ptr_eq(&output.track, &system));
    assert!(!output.is_mixed());
    assert_eq!(factory.log.created.load(Ordering::SeqCst), 0);

    let microphone = audio_track("microphone");
    let output =
        AudioMixGraph::mix(&factory, PlatformClass::Default, None, Some(&microphone)).unwrap();
    assert!(Arc::ptr_eq(&output.track, &microphone));
    assert_eq!(factory.log.created.load(Ordering::SeqCst), 0);
}

#[test]
fn two_inputs_build_one_gain_staged_graph() {
    let factory = MockGraphFactory::new();
    let system = audio_track("system");
    let microphone = audio_track("microphone");

    let output = AudioMixGraph::mix(
        &factory,
        PlatformClass::Constrained,
        Some(&system),
        Some(&microphone),
    )
    .unwrap();

    assert!(output.is_mixed());
    assert!(!Arc::ptr_eq(&output.track, &system));
    assert_eq!(factory.log.created.load(Ordering::SeqCst), 1);
    assert_eq!(
        *factory.log.connections.lock(),
        vec![("system".to_string(), 0.8), ("microphone".to_string(), 0.7)]
    );

    let settings = factory.log.settings_seen.lock().unwrap();
    assert_eq!(settings.sample_rate, 44_100);
}

#[test]
fn default_class_mixes_at_unity() {
    let factory = MockGraphFactory::new();
    let system = audio_track("system");
    let microphone = audio_track("microphone");

    AudioMixGraph::mix(
        &factory,
        PlatformClass::Default,
        Some(&system),
        Some(&microphone),
    )
    .unwrap();

    assert_eq!(
        *factory.log.connections.lock(),
        vec![("system".to_string(), 1.0), ("microphone".to_string(), 1.0)]
    );
    let settings = factory.log.settings_seen.lock().unwrap();
    assert_eq!(settings.sample_rate, 48_000);
}

#[test]
fn mixed_output_debug_names_the_track() {
    let factory = MockGraphFactory::new();
    let system = audio_track("system");

    let output =
        AudioMixGraph::mix(&factory, PlatformClass::Default, Some(&system), None).unwrap();
    let rendered = format!("{output:?}");
    assert!(rendered.contains("system"));
    assert!(rendered.contains("mixed: false"));
}

#[test]
fn no_inputs_is_an_error() {
    let factory = MockGraphFactory::new();
    let err = AudioMixGraph::mix(&factory, PlatformClass::Default, None, None).unwrap_err();
    assert!(matches!(err, RecastError::NoAudioToMix));
}

#[test]
fn close_releases_the_graph_exactly_once() {
    let factory = MockGraphFactory::new();
    let system = audio_track("system");
    let microphone = audio_track("microphone");

    let mut output = AudioMixGraph::mix(
        &factory,
        PlatformClass::Default,
        Some(&system),
        Some(&microphone),
    )
    .unwrap();

    output.close();
    output.close();
    drop(output);
    assert_eq!(factory.log.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_an_unclosed_output_closes_the_graph() {
    let factory = MockGraphFactory::new();
    let system = audio_track("system");
    let microphone = audio_track("microphone");

    let output = AudioMixGraph::mix(
        &factory,
        PlatformClass::Default,
        Some(&system),
        Some(&microphone),
    )
    .unwrap();
    drop(output);

    assert_eq!(factory.log.closed.load(Ordering::SeqCst), 1);
}
