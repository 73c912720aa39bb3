// These tests drive source programs through the front end, the SSA builder and the out-of-SSA
// pass, then check the middle of the pipeline without producing machine code. The reference
// evaluator runs each function both before and after phi resolution and must agree with the
// expected program result, and the block structure of the classic if/else merge is checked
// for its single two-entry phi. For control-flow-heavy programs every use must be dominated
// by its definition (phi inputs by the end of the incoming edge's predecessor), and the
// interference graph must hold exactly the pairs where one value is defined while the other
// is live. On the allocation side every allocated function must carry a proper coloring of
// its interference graph; straight-line code, whose interference graph is an interval graph,
// must use exactly as many colors as the widest live set at a definition; allocating the same
// sequence twice must give the same assignment; and a register cap must push the excess
// colors into stack slots.

//! Integration tests for SSA construction, liveness and chordal allocation.

use bumpalo::Bump;
use chordc::analysis::{interference, liveness, linearize};
use chordc::core::CompilationSession;
use chordc::frontend::check_program;
use chordc::ir::builder::build_program;
use chordc::ir::eval::evaluate;
use chordc::ir::phi_resolver::resolve_phis;
use chordc::ir::{BinaryOp, BlockId, IrFunction, IrInstruction, ValueId};
use chordc::regalloc::{allocate, Register};
use std::collections::{BTreeMap, BTreeSet};

fn build_main(source: &str) -> IrFunction {
    let program = check_program(source).unwrap();
    build_program(&program)
        .unwrap()
        .into_iter()
        .find(|f| f.is_entry)
        .unwrap()
}

/// Evaluate `main` in SSA form and again after phi resolution.
fn run_both_forms(source: &str) -> (i32, i32) {
    let mut function = build_main(source);
    let before = evaluate(&function).unwrap();
    resolve_phis(&mut function).unwrap();
    assert!(!function.has_phis());
    let after = evaluate(&function).unwrap();
    (before, after)
}

#[test]
fn test_straight_line_arithmetic() {
    let _ = env_logger::builder().is_test(true).try_init();
    let function = build_main("int main(){ return 2 + 3 * 4; }");

    assert_eq!(function.blocks.len(), 1);
    let instructions = &function.blocks[0].instructions;
    let constants: Vec<i32> = instructions
        .iter()
        .filter_map(|inst| match inst {
            IrInstruction::Const { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    assert_eq!(constants, vec![2, 3, 4]);
    assert!(instructions.iter().any(|inst| matches!(
        inst,
        IrInstruction::Binary { op: BinaryOp::Mul, .. }
    )));
    assert!(instructions.iter().any(|inst| matches!(
        inst,
        IrInstruction::Binary { op: BinaryOp::Add, .. }
    )));
    assert!(matches!(
        instructions.last(),
        Some(IrInstruction::Return { .. })
    ));
    assert_eq!(evaluate(&function).unwrap(), 14);
}

#[test]
fn test_branch_merge_phi() {
    let source = "int main(){ int x = 1; if (true) { x = 2; } else { x = 3; } return x; }";
    let function = build_main(source);

    let merge = function
        .blocks
        .iter()
        .find(|b| b.label.starts_with("merge"))
        .unwrap();
    let phis: Vec<_> = merge.phis().collect();
    assert_eq!(phis.len(), 1);
    let IrInstruction::Phi { incoming, .. } = phis[0] else {
        panic!("expected a phi, got {}", phis[0]);
    };
    let mut preds: Vec<&str> = incoming
        .iter()
        .map(|(_, pred)| function.block(*pred).label.as_str())
        .collect();
    preds.sort();
    assert_eq!(preds.len(), 2);
    assert!(preds[0].starts_with("else"));
    assert!(preds[1].starts_with("then"));

    assert_eq!(run_both_forms(source), (2, 2));
}

#[test]
fn test_loop_and_division_results() {
    assert_eq!(
        run_both_forms(
            "int main(){ int s = 0; int i = 0; while (i < 3) { s = s + i; i = i + 1; } return s; }"
        ),
        (3, 3)
    );
    assert_eq!(run_both_forms("int main(){ return 17 % 5; }"), (2, 2));
    assert_eq!(
        run_both_forms(
            "int main(){ int a = 0; int b = 1; for (int i = 0; i < 10; i++) { int t = a + b; a = b; b = t; } return a; }"
        ),
        (55, 55)
    );
}

/// Build, resolve and allocate every function of `source`.
fn check_allocation(source: &str, limit: Option<usize>) {
    let program = check_program(source).unwrap();
    let mut functions = build_program(&program).unwrap();
    for function in &mut functions {
        resolve_phis(function).unwrap();
    }

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    for function in &functions {
        let seq = linearize(&session, function);
        let live = liveness::analyze(&seq).unwrap();
        let graph = interference::build(&seq, &live).unwrap();
        let result = allocate(&seq, limit).unwrap();

        for value in graph.nodes() {
            let color = result.colors[&value];
            assert!(result.location(value).is_some());
            for neighbor in graph.neighbors(value).unwrap() {
                assert_ne!(color, result.colors[neighbor], "{value} and {neighbor}");
                assert_ne!(result.location(value), result.location(*neighbor));
            }
        }
        assert_eq!(result.ordering.len(), graph.node_count());
    }
}

#[test]
fn test_allocation_is_a_valid_coloring() {
    let _ = env_logger::builder().is_test(true).try_init();
    let programs = [
        "int main(){ return 2 + 3 * 4; }",
        "int main(){ int x = 1; if (true) { x = 2; } else { x = 3; } return x; }",
        "int main(){ int s = 0; int i = 0; while (i < 3) { s = s + i; i = i + 1; } return s; }",
        "int main(){ int a = 1; int b = 2; while (a < 100) { int t = a; a = a + b; b = t; } return a ^ b; }",
        "int f() { int x = 5; return x << 2; } int main(){ bool p = 3 < 4 && 1 != 2; return p ? 1 : 0; }",
    ];
    for source in programs {
        check_allocation(source, None);
        check_allocation(source, Some(2));
    }
}

#[test]
fn test_straight_line_colors_match_widest_live_set() {
    let source = "int main(){ int a = 1; int b = 2; int c = a + b; int d = c * a; int e = d - b; return e + c; }";
    let function = build_main(source);
    assert_eq!(function.blocks.len(), 1);

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let seq = linearize(&session, &function);
    let live = liveness::analyze(&seq).unwrap();

    let widest = seq
        .nodes()
        .iter()
        .filter_map(|node| {
            node.instruction.target().map(|target| {
                let mut set: BTreeSet<_> = live.live_after(node.position).clone();
                set.insert(target.id);
                set.len()
            })
        })
        .max()
        .unwrap();

    let result = allocate(&seq, None).unwrap();
    assert_eq!(result.color_count, widest);
    assert_eq!(result.stack_slots, 0);
}

#[test]
fn test_allocation_is_deterministic() {
    let function = build_main(
        "int main(){ int s = 0; int i = 0; while (i < 10) { s = s + i * i; i = i + 1; } return s; }",
    );
    let mut function = function;
    resolve_phis(&mut function).unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let seq = linearize(&session, &function);
    let first = allocate(&seq, None).unwrap();
    let second = allocate(&seq, None).unwrap();
    assert_eq!(first.colors, second.colors);
    assert_eq!(first.ordering, second.ordering);
    assert_eq!(first.locations, second.locations);
}

#[test]
fn test_register_cap_spills_to_stack_slots() {
    let source = "int main(){ int a = 1; int b = 2; int c = 3; int d = 4; return a + b + c + d; }";
    let function = build_main(source);

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let seq = linearize(&session, &function);

    let unlimited = allocate(&seq, None).unwrap();
    assert_eq!(unlimited.stack_slots, 0);

    let capped = allocate(&seq, Some(2)).unwrap();
    assert_eq!(capped.color_count, unlimited.color_count);
    assert_eq!(
        capped.stack_slots as usize,
        unlimited.color_count.saturating_sub(2)
    );
    let spilled = capped
        .locations
        .values()
        .filter(|location| location.is_stack())
        .count();
    assert!(spilled > 0);
    for location in capped.locations.values() {
        if let Register::StackSlot(slot) = location {
            assert!(*slot < capped.stack_slots);
        }
    }
    assert_eq!(capped.frame_size(), (capped.stack_slots as i32 + 1) * 8);
}

/// Programs with nested loops, early exits and short-circuit conditions.
const CONTROL_FLOW_PROGRAMS: [&str; 3] = [
    "int main(){ int s = 0; for (int i = 0; i < 5; i++) { for (int j = 0; j < 5; j++) { if (j == i) { continue; } if (j > 3) { break; } s += i * j; } } return s; }",
    "int main(){ int a = 0; int b = 10; while (a < b && (a % 2 == 0 ? b > 3 : true)) { a += 3; b -= 1; } return a + b; }",
    "int main(){ int x = 1; int y = 2; int n = 0; while (n < 6) { n++; if (n % 2 == 1) { continue; } int t = x; x = y; y = t; } return x * 10 + y; }",
];

/// Dominator sets over the reachable blocks, by iteration to a fixed point.
fn dominators(function: &IrFunction) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
    let layout = function.layout();
    let reachable: BTreeSet<BlockId> = layout.iter().copied().collect();
    let mut dom: BTreeMap<BlockId, BTreeSet<BlockId>> = layout
        .iter()
        .map(|&b| {
            let set = if b == function.start {
                BTreeSet::from([b])
            } else {
                reachable.clone()
            };
            (b, set)
        })
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &block in layout.iter().filter(|&&b| b != function.start) {
            let mut preds = function
                .block(block)
                .predecessors
                .iter()
                .filter(|p| reachable.contains(*p));
            let Some(first) = preds.next() else {
                continue;
            };
            let mut set = dom[first].clone();
            for pred in preds {
                set = set.intersection(&dom[pred]).copied().collect();
            }
            set.insert(block);
            if dom[&block] != set {
                dom.insert(block, set);
                changed = true;
            }
        }
    }
    dom
}

#[test]
fn test_definitions_dominate_uses() {
    let _ = env_logger::builder().is_test(true).try_init();
    for source in CONTROL_FLOW_PROGRAMS {
        let function = build_main(source);
        let dom = dominators(&function);

        let mut defs: BTreeMap<ValueId, (BlockId, usize)> = BTreeMap::new();
        for &block in dom.keys() {
            for (index, inst) in function.block(block).instructions.iter().enumerate() {
                if let Some(target) = inst.target() {
                    let previous = defs.insert(target.id, (block, index));
                    assert!(previous.is_none(), "{} defined twice in {source}", target.id);
                }
            }
        }

        for (&block, dominators_of_block) in &dom {
            for (index, inst) in function.block(block).instructions.iter().enumerate() {
                if let IrInstruction::Phi { incoming, .. } = inst {
                    for (value, pred) in incoming {
                        let (def_block, _) = defs[&value.id];
                        assert!(
                            dom[pred].contains(&def_block),
                            "{value} from {pred} is not dominated by {def_block} in {source}"
                        );
                    }
                    continue;
                }
                for operand in inst.operands() {
                    let (def_block, def_index) = defs[&operand.id];
                    let dominated = if def_block == block {
                        def_index < index
                    } else {
                        dominators_of_block.contains(&def_block)
                    };
                    assert!(
                        dominated,
                        "use of {operand} in {block} precedes its definition in {source}"
                    );
                }
            }
        }
    }
}

#[test]
fn test_interference_matches_overlapping_live_ranges() {
    for source in CONTROL_FLOW_PROGRAMS {
        let mut function = build_main(source);
        resolve_phis(&mut function).unwrap();

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let seq = linearize(&session, &function);
        let live = liveness::analyze(&seq).unwrap();
        let graph = interference::build(&seq, &live).unwrap();

        let mut overlapping: BTreeSet<(ValueId, ValueId)> = BTreeSet::new();
        for node in seq.nodes() {
            let Some(target) = node.instruction.target() else {
                continue;
            };
            for &other in live.live_after(node.position) {
                if other != target.id {
                    overlapping.insert((target.id.min(other), target.id.max(other)));
                }
            }
        }

        for &(a, b) in &overlapping {
            assert!(graph.interferes(a, b), "{a} and {b} overlap in {source}");
        }
        let mut edges = 0;
        for a in graph.nodes() {
            for &b in graph.neighbors(a).unwrap() {
                assert!(
                    overlapping.contains(&(a.min(b), a.max(b))),
                    "{a} -- {b} without overlapping live ranges in {source}"
                );
                edges += 1;
            }
        }
        assert_eq!(edges / 2, overlapping.len());
        assert_eq!(graph.edge_count(), overlapping.len());
    }
}
