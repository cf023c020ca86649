use solvra_repair::controller::{
    Action, ControllerConfig, ControllerState, Observation, SelfDebugController,
};

const FAILING: Observation = Observation {
    all_pretests_passed: false,
    error_raised: false,
};

#[test]
fn two_function_repairs_then_solution_repair() {
    let mut controller = SelfDebugController::new(ControllerConfig {
        max_solution_debug_times: 1,
        ..ControllerConfig::default()
    });

    let first = controller.decide(FAILING);
    assert_eq!(
        first,
        vec![
            Action::GenerateCounterexamples {
                count: 4,
                use_pretests: false
            },
            Action::DebugFunction { count: 8 },
            Action::EvaluatePretests {
                max_attempts: 100_000,
                max_time: std::time::Duration::from_secs(240),
            },
        ]
    );
    assert_eq!(controller.state().program_debug_times, 1);

    let second = controller.decide(FAILING);
    assert_eq!(second, first);
    assert_eq!(controller.state().program_debug_times, 2);

    let third = controller.decide(FAILING);
    assert!(matches!(
        third.as_slice(),
        [
            Action::GenerateCounterexamples { .. },
            Action::DebugSolution,
            Action::GenerateIr,
            Action::GenerateFunctions { count: 16 },
            Action::EvaluatePretests { .. },
        ]
    ));
    assert_eq!(
        controller.state(),
        ControllerState {
            restart_times: 0,
            solution_debug_times: 1,
            program_debug_times: 0,
        }
    );
}

#[test]
fn counters_only_move_forward_until_restart() {
    let config = ControllerConfig {
        max_restart_times: 2,
        max_solution_debug_times: 2,
        max_program_debug_times: 3,
        ..ControllerConfig::default()
    };
    let mut controller = SelfDebugController::new(config.clone());
    let mut previous = controller.state();
    let mut rounds = 0;

    loop {
        let actions = controller.decide(FAILING);
        rounds += 1;
        let state = controller.state();

        if actions.last() == Some(&Action::Finish) {
            assert_eq!(state, previous);
            break;
        }
        if state.restart_times > previous.restart_times {
            assert_eq!(state.restart_times, previous.restart_times + 1);
            assert_eq!((state.solution_debug_times, state.program_debug_times), (0, 0));
        } else if state.solution_debug_times > previous.solution_debug_times {
            assert_eq!(previous.program_debug_times, config.max_program_debug_times);
            assert_eq!(state.program_debug_times, 0);
        } else {
            assert_eq!(state.program_debug_times, previous.program_debug_times + 1);
        }
        assert!(state.program_debug_times <= config.max_program_debug_times);
        assert!(state.solution_debug_times <= config.max_solution_debug_times);
        previous = state;
        assert!(rounds < 100, "controller never finished");
    }

    // 11 repair rounds per generation, 3 generations, 2 restarts, then finish.
    assert_eq!(rounds, 11 * 3 + 2 + 1);
}

#[test]
fn error_observation_always_restarts() {
    let mut controller = SelfDebugController::new(ControllerConfig {
        max_restart_times: 0,
        ..ControllerConfig::default()
    });
    let error = Observation {
        all_pretests_passed: false,
        error_raised: true,
    };
    let actions = controller.decide(error);
    assert_eq!(actions[0], Action::GenerateSolution);
    assert_eq!(controller.state().restart_times, 1);
    // The restart budget only guards the exhausted-repair branch.
    let actions = controller.decide(FAILING);
    assert!(matches!(actions[1], Action::DebugFunction { .. }));
}

#[test]
fn default_budget_skips_solution_repair() {
    let mut controller = SelfDebugController::new(ControllerConfig::default());
    controller.decide(FAILING);
    controller.decide(FAILING);
    let actions = controller.decide(FAILING);
    assert_eq!(actions[0], Action::GenerateSolution);
    assert_eq!(controller.state().restart_times, 1);
}
