use proptest::prelude::*;
use rustc_hash::FxHashSet;
use tyflow_ir::{BinaryOperator, BlockId, CodeObject, Instruction, Opcode, OrderedCode, order_code};

fn straight_op() -> impl Strategy<Value = Opcode> {
    prop::sample::select(vec![
        Opcode::Nop,
        Opcode::LoadConst,
        Opcode::LoadName,
        Opcode::StoreName,
        Opcode::PopTop,
        Opcode::DupTop,
        Opcode::RotTwo,
        Opcode::BinaryOp(BinaryOperator::Add),
        Opcode::BuildTuple,
        Opcode::LoadAttr,
        Opcode::CallFunction,
    ])
}

/// Random branchy code: plain instructions, jumps and returns with
/// arbitrary in-range targets.
fn jumpy_code() -> impl Strategy<Value = Vec<Instruction>> {
    (2usize..30).prop_flat_map(|len| {
        prop::collection::vec((0u8..5, 0..len), len).prop_map(|picks| {
            picks
                .into_iter()
                .enumerate()
                .map(|(index, (kind, target))| match kind {
                    0 => Instruction::new(index, 1, Opcode::JumpAbsolute).with_target(target),
                    1 => Instruction::new(index, 1, Opcode::PopJumpIfFalse).with_target(target),
                    2 => Instruction::new(index, 1, Opcode::ReturnValue),
                    _ => Instruction::new(index, 1, Opcode::Nop),
                })
                .collect()
        })
    })
}

/// Structured control flow: conditionals, loops with `break`, and
/// `try`/`except` and `try`/`finally` blocks, nested a few levels deep.
#[derive(Clone, Debug)]
enum Shape {
    Plain,
    Return,
    Raise,
    Break,
    If(Vec<Shape>),
    Loop(Vec<Shape>),
    Except(Vec<Shape>),
    Finally(Vec<Shape>),
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        4 => Just(Shape::Plain),
        1 => Just(Shape::Return),
        1 => Just(Shape::Raise),
        1 => Just(Shape::Break),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        let body = prop::collection::vec(inner, 1..4);
        prop_oneof![
            body.clone().prop_map(Shape::If),
            body.clone().prop_map(Shape::Loop),
            body.clone().prop_map(Shape::Except),
            body.prop_map(Shape::Finally),
        ]
    })
}

/// Lays shapes out the way the 3.7 compiler does.
#[derive(Default)]
struct Emitter {
    code: Vec<Instruction>,
    loops: usize,
}

impl Emitter {
    fn emit(&mut self, op: Opcode) -> usize {
        let index = self.code.len();
        self.code.push(Instruction::new(index, 1, op));
        index
    }

    fn patch(&mut self, at: usize, target: usize) {
        self.code[at].target = Some(target);
    }

    fn shapes(&mut self, shapes: &[Shape]) {
        for shape in shapes {
            self.shape(shape);
        }
    }

    fn shape(&mut self, shape: &Shape) {
        match shape {
            Shape::Plain => {
                self.emit(Opcode::Nop);
            }
            Shape::Return => {
                self.emit(Opcode::ReturnValue);
            }
            Shape::Raise => {
                self.emit(Opcode::RaiseVarargs);
            }
            Shape::Break if self.loops > 0 => {
                self.emit(Opcode::BreakLoop);
            }
            Shape::Break => {
                self.emit(Opcode::Nop);
            }
            Shape::If(body) => {
                let test = self.emit(Opcode::PopJumpIfFalse);
                self.shapes(body);
                let end = self.emit(Opcode::Nop);
                self.patch(test, end);
            }
            Shape::Loop(body) => {
                let setup = self.emit(Opcode::SetupLoop);
                let head = self.emit(Opcode::PopJumpIfFalse);
                self.loops += 1;
                self.shapes(body);
                self.loops -= 1;
                let back = self.emit(Opcode::JumpAbsolute);
                self.patch(back, head);
                let pop = self.emit(Opcode::PopBlock);
                self.patch(head, pop);
                let exit = self.emit(Opcode::Nop);
                self.patch(setup, exit);
            }
            Shape::Except(body) => {
                let setup = self.emit(Opcode::SetupExcept);
                self.shapes(body);
                self.emit(Opcode::PopBlock);
                let skip = self.emit(Opcode::JumpForward);
                let handler = self.emit(Opcode::PopTop);
                self.patch(setup, handler);
                let end = self.emit(Opcode::Nop);
                self.patch(skip, end);
            }
            Shape::Finally(body) => {
                let setup = self.emit(Opcode::SetupFinally);
                self.shapes(body);
                self.emit(Opcode::PopBlock);
                self.emit(Opcode::LoadConst);
                let handler = self.emit(Opcode::EndFinally);
                self.patch(setup, handler);
            }
        }
    }
}

fn structured_code() -> impl Strategy<Value = Vec<Instruction>> {
    prop::collection::vec(shape(), 1..6).prop_map(|shapes| {
        let mut emitter = Emitter::default();
        emitter.shapes(&shapes);
        emitter.emit(Opcode::ReturnValue);
        emitter.code
    })
}

fn code(name: &str, instructions: Vec<Instruction>) -> CodeObject {
    CodeObject::builder()
        .name(name)
        .instructions(instructions)
        .build()
}

fn reaches(graph: &OrderedCode, from: BlockId, to: BlockId) -> bool {
    let mut seen = FxHashSet::default();
    let mut todo = vec![from];
    while let Some(id) = todo.pop() {
        if id == to {
            return true;
        }
        if seen.insert(id) {
            todo.extend(graph.expect_block(id).outgoing());
        }
    }
    false
}

proptest! {
    #[test]
    fn straight_line_code_is_one_block(ops in prop::collection::vec(straight_op(), 1..40)) {
        let len = ops.len();
        let instructions = ops
            .into_iter()
            .enumerate()
            .map(|(index, op)| Instruction::new(index, 1, op))
            .collect();
        let graph = order_code(code("straight", instructions)).unwrap();
        prop_assert_eq!(graph.blocks().len(), 1);
        prop_assert_eq!(graph.blocks()[0].len(), len);
        prop_assert_eq!(graph.order(), &[BlockId(0)][..]);
    }

    #[test]
    fn jump_targets_start_blocks(instructions in jumpy_code()) {
        let targets: Vec<usize> = instructions.iter().filter_map(|inst| inst.target).collect();
        let total = instructions.len();
        let graph = order_code(code("jumpy", instructions)).unwrap();
        for target in targets {
            prop_assert!(graph.block_starting_at(target).is_some());
        }
        let covered: usize = graph.blocks().iter().map(|block| block.len()).sum();
        prop_assert_eq!(covered, total);
    }

    #[test]
    fn predecessors_come_first_except_back_edges(instructions in jumpy_code()) {
        let graph = order_code(code("jumpy", instructions)).unwrap();
        let position = |id: BlockId| graph.order().iter().position(|&o| o == id);
        for (pos, &id) in graph.order().iter().enumerate() {
            for pred in graph.expect_block(id).incoming() {
                let pred_pos = position(pred).expect("predecessors of reachable blocks are reachable");
                if pred_pos >= pos {
                    prop_assert!(reaches(&graph, id, pred), "{pred} -> {id} is not a back edge");
                }
            }
        }
        prop_assert_eq!(graph.order().len() + graph.dead_blocks().len(), graph.blocks().len());
    }

    #[test]
    fn rebuilding_preserves_the_graph(instructions in jumpy_code()) {
        let graph = order_code(code("jumpy", instructions)).unwrap();
        let again = order_code(graph.to_code()).unwrap();
        prop_assert_eq!(graph.to_string(), again.to_string());
    }

    #[test]
    fn structured_targets_start_blocks(instructions in structured_code()) {
        let total = instructions.len();
        let graph = order_code(code("structured", instructions)).unwrap();
        for inst in graph.flatten() {
            for target in inst.target.into_iter().chain(inst.block_target) {
                prop_assert!(graph.block_starting_at(target).is_some(), "{inst}");
            }
        }
        let covered: usize = graph.blocks().iter().map(|block| block.len()).sum();
        prop_assert_eq!(covered, total);
    }

    #[test]
    fn block_exits_are_edges(instructions in structured_code()) {
        let graph = order_code(code("structured", instructions)).unwrap();
        for block in graph.ordered_blocks() {
            if let Some(target) = block.last().block_target {
                let exit = graph.block_starting_at(target).unwrap().id();
                prop_assert!(block.has_outgoing(exit), "{} -> {}", block.id(), exit);
            }
        }
    }

    #[test]
    fn structured_predecessors_come_first(instructions in structured_code()) {
        let graph = order_code(code("structured", instructions)).unwrap();
        let position = |id: BlockId| graph.order().iter().position(|&o| o == id);
        for (pos, &id) in graph.order().iter().enumerate() {
            for pred in graph.expect_block(id).incoming() {
                let pred_pos = position(pred).expect("predecessors of reachable blocks are reachable");
                if pred_pos >= pos {
                    prop_assert!(reaches(&graph, id, pred), "{pred} -> {id} is not a back edge");
                }
            }
        }
    }

    #[test]
    fn rebuilding_structured_code_is_stable(instructions in structured_code()) {
        let graph = order_code(code("structured", instructions)).unwrap();
        let again = order_code(graph.to_code()).unwrap();
        prop_assert_eq!(graph.to_string(), again.to_string());
        prop_assert_eq!(graph.dead_blocks(), again.dead_blocks());
    }
}
