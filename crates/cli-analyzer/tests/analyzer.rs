//! End-to-end parses against small hand-built grammars, exercising each
//! state-machine tie-break and capture/receiver combination independently.

use regex::Regex;

use cli_analyzer::{
    analyze, analyze_loopflow, AnalyzeOutcome, CaptureRejected, CountRx, DefaultRx, Fragment,
    FragmentError, FragmentGroup, LoopflowExitReason, RegexCapture, SubcommandPattern,
    VecTokenBuffer,
};

fn accepted(outcome: AnalyzeOutcome<'_>) -> cli_analyzer::Accepted<'_> {
    match outcome {
        AnalyzeOutcome::Accepted(a) => a,
        AnalyzeOutcome::Rejected(r) => panic!("expected acceptance, got rejection: {r}"),
    }
}

#[test]
fn variadic_positional_plus_header_separator_option() {
    let mut pattern = SubcommandPattern::build("test")
        .fragment(Fragment::new("name"))
        .fragment(Fragment::new("rest").variadic())
        .finish();
    pattern.option("--from").fragment(Fragment::new("from.name")).header_separators("=").attach();

    let mut buffer = VecTokenBuffer::new(["alice", "a", "b", "c", "--from=src"]);
    let outcome = analyze(&pattern, &mut buffer).unwrap();
    let accepted = accepted(outcome);

    let mix = &accepted.snapshot.mix;
    assert_eq!(mix.assignes["name"].as_str(), Some("alice"));
    let rest = mix.assignes["rest"].as_list().unwrap();
    assert_eq!(rest.iter().map(|v| v.as_str().unwrap()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
    assert_eq!(mix.assignes["from.name"].as_str(), Some("src"));
}

#[test]
fn count_receiver_tallies_repeated_flags() {
    let mut pattern = SubcommandPattern::build("test").finish();
    pattern.option("-v").header_fragment(Fragment::new("v").receiver(CountRx)).allow_duplicate(true).attach();

    let mut buffer = VecTokenBuffer::new(["-v", "-v", "-v"]);
    let outcome = analyze(&pattern, &mut buffer).unwrap();
    let accepted = accepted(outcome);

    assert_eq!(accepted.snapshot.mix.assignes["v"].as_count(), Some(3));
}

#[test]
fn soft_keyword_is_data_until_the_stage_it_belongs_to_is_satisfied() {
    // Stage unsatisfied: the owning command still needs `mode`, so the soft
    // keyword option never gets a chance to act as a keyword — it's
    // captured as the pending fragment's literal value instead.
    let mut unsatisfied = SubcommandPattern::build("test").fragment(Fragment::new("mode")).finish();
    unsatisfied.option("--verbose").soft_keyword(true).header_fragment(Fragment::new("verbose_flag")).attach();

    let mut buffer = VecTokenBuffer::new(["--verbose"]);
    let outcome = analyze(&unsatisfied, &mut buffer).unwrap();
    let accepted = accepted(outcome);
    assert_eq!(accepted.snapshot.mix.assignes["mode"].as_str(), Some("--verbose"));
    assert!(!accepted.snapshot.mix.assignes.contains_key("verbose_flag"));

    // Stage already satisfied (nothing else required): the same soft
    // keyword now triggers a real option entry.
    let satisfied = {
        let mut p = SubcommandPattern::build("test").finish();
        p.option("--verbose").soft_keyword(true).header_fragment(Fragment::new("verbose_flag").receiver(DefaultRx)).attach();
        p
    };

    let mut buffer = VecTokenBuffer::new(["--verbose"]);
    let outcome = analyze(&satisfied, &mut buffer).unwrap();
    let accepted = accepted(outcome);
    assert_eq!(accepted.snapshot.mix.assignes["verbose_flag"].as_str(), Some("--verbose"));
}

#[test]
fn compact_header_subcommand_enters_instantly_from_a_single_token() {
    let mut root = SubcommandPattern::build("test").compact_header(true).finish();
    let sub = SubcommandPattern::build("sub")
        .fragment(Fragment::new("val"))
        .compact_header(true)
        .enter_instantly(true)
        .finish();
    root.attach_subcommand(sub);

    let mut snapshot = root.header_entrypoint();
    let mut buffer = VecTokenBuffer::new(["testsubx"]);
    let reason = analyze_loopflow(&mut snapshot, &mut buffer).unwrap();

    assert_eq!(reason, LoopflowExitReason::Satisfied);
    assert_eq!(snapshot.command, vec!["test".to_string(), "sub".to_string()]);
    assert_eq!(snapshot.mix.assignes["val"].as_str(), Some("x"));
}

#[test]
fn non_forwarding_option_does_not_excuse_the_commands_own_fragment() {
    let mut pattern = SubcommandPattern::build("test").fragment(Fragment::new("arg")).finish();
    pattern.option("--flag").forwarding(false).attach();

    let mut missing_arg = VecTokenBuffer::new(["--flag"]);
    let outcome = analyze(&pattern, &mut missing_arg).unwrap();
    match outcome {
        AnalyzeOutcome::Rejected(r) => assert_eq!(r.reason, LoopflowExitReason::Unsatisfied),
        AnalyzeOutcome::Accepted(_) => panic!("expected rejection: --flag does not supply `arg`"),
    }

    let mut with_arg = VecTokenBuffer::new(["v", "--flag"]);
    let outcome = analyze(&pattern, &mut with_arg).unwrap();
    let accepted = accepted(outcome);
    assert_eq!(accepted.snapshot.mix.assignes["arg"].as_str(), Some("v"));
}

#[test]
#[should_panic(expected = "header_separators must be used with fragments")]
fn header_separators_without_fragments_is_rejected_at_build_time() {
    let mut pattern = SubcommandPattern::build("test").finish();
    pattern.option("--from").header_separators("=").attach();
}

#[test]
fn fragment_group_rejects_a_sibling_once_one_member_has_captured() {
    let group_a = {
        let mut g = FragmentGroup::new("grp-a");
        g.rejects = vec!["grp-b".to_string()];
        g
    };
    let group_b = {
        let mut g = FragmentGroup::new("grp-b");
        g.rejects = vec!["grp-a".to_string()];
        g
    };

    let frag_a = Fragment { group: Some(group_a), ..Fragment::new("a_flag") };
    let frag_b = Fragment { group: Some(group_b), ..Fragment::new("b_flag") };

    let mut pattern = SubcommandPattern::build("test").finish();
    pattern.option("--a").header_fragment(frag_a).attach();
    pattern.option("--b").header_fragment(frag_b).attach();

    let mut buffer = VecTokenBuffer::new(["--a", "--b"]);
    let outcome = analyze(&pattern, &mut buffer).unwrap();

    match outcome {
        AnalyzeOutcome::Rejected(r) => {
            assert_eq!(r.reason, LoopflowExitReason::ComponentRejected);
            match r.cause {
                Some(FragmentError::Capture(CaptureRejected::GroupRejected { group })) => {
                    assert_eq!(group, "grp-b");
                }
                other => panic!("expected a GroupRejected capture cause, got {other:?}"),
            }
        }
        AnalyzeOutcome::Accepted(_) => panic!("expected --b to be rejected by its mutual-exclusion group"),
    }
}

#[test]
fn regex_capture_splits_a_partially_matching_token_into_two_fragments() {
    let mut pattern = SubcommandPattern::build("test")
        .fragment(Fragment::new("digits").capture(RegexCapture::new(Regex::new(r"^\d+").unwrap())))
        .fragment(Fragment::new("rest"))
        .finish();

    let mut buffer = VecTokenBuffer::new(["123abc"]);
    let outcome = analyze(&pattern, &mut buffer).unwrap();
    let accepted = accepted(outcome);

    assert_eq!(accepted.snapshot.mix.assignes["digits"].as_str(), Some("123"));
    assert_eq!(accepted.snapshot.mix.assignes["rest"].as_str(), Some("abc"));
}
