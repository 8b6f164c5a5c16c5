use super::{Block, Function, Insn, InsnData, Value};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorLocation {
    At(Insn),
    BlockTop(Block),
    BlockBottom(Block),
    #[default]
    NoWhere,
}

pub trait FuncCursor {
    fn at_location(loc: CursorLocation) -> Self;
    fn set_location(&mut self, loc: CursorLocation);
    fn loc(&self) -> CursorLocation;

    fn insert_insn(&mut self, func: &mut Function, insn: Insn) {
        match self.loc() {
            CursorLocation::At(at) => func.layout.insert_insn_after(insn, at),
            CursorLocation::BlockTop(block) => func.layout.prepend_insn(insn, block),
            CursorLocation::BlockBottom(block) => func.layout.append_insn(insn, block),
            CursorLocation::NoWhere => panic!("cursor loc points to `NoWhere`"),
        }
    }

    fn insert_insn_before(&mut self, func: &mut Function, insn: Insn) {
        match self.loc() {
            CursorLocation::At(at) => func.layout.insert_insn_before(insn, at),
            CursorLocation::BlockTop(block) => func.layout.prepend_insn(insn, block),
            CursorLocation::BlockBottom(block) => func.layout.append_insn(insn, block),
            CursorLocation::NoWhere => panic!("cursor loc points to `NoWhere`"),
        }
    }

    fn append_insn(&mut self, func: &mut Function, insn: Insn) {
        let current_block = self.expect_block(func);
        func.layout.append_insn(insn, current_block);
    }

    fn insert_insn_data(&mut self, func: &mut Function, data: InsnData) -> Insn {
        let insn = func.dfg.make_insn(data);
        self.insert_insn(func, insn);
        insn
    }

    /// Inserts `data` before the current instruction and makes its result.
    fn insert_before_with_result(
        &mut self,
        func: &mut Function,
        data: InsnData,
    ) -> (Insn, Option<Value>) {
        let ty = data.result_type(&func.dfg);
        let insn = func.dfg.make_insn(data);
        self.insert_insn_before(func, insn);
        let result = ty.map(|ty| func.dfg.make_result(insn, ty, None));
        (insn, result)
    }

    /// Removes the current instruction and moves the cursor to the next
    /// location.
    fn remove_insn(&mut self, func: &mut Function) {
        let insn = self.expect_insn();
        let next_loc = self.next_loc(func);

        func.dfg.detach_user(insn);
        func.layout.remove_insn(insn);

        self.set_location(next_loc);
    }

    fn make_block(&mut self, func: &mut Function) -> Block {
        func.dfg.make_block(None)
    }

    fn remove_block(&mut self, func: &mut Function) {
        let block = match self.loc() {
            CursorLocation::At(insn) => func.layout.insn_block(insn),
            CursorLocation::BlockTop(block) | CursorLocation::BlockBottom(block) => block,
            CursorLocation::NoWhere => panic!("cursor loc points `NoWhere`"),
        };

        // Store next block of the current block for later use.
        let next_block = func.layout.next_block_of(block);

        // Remove all insns in the current block.
        if let Some(first_insn) = func.layout.first_insn_of(block) {
            self.set_location(CursorLocation::At(first_insn));
            while matches!(self.loc(), CursorLocation::At(..)) {
                self.remove_insn(func);
            }
        }
        // Remove current block.
        func.layout.remove_block(block);

        // Set cursor location to next block if exists.
        if let Some(next_block) = next_block {
            self.set_location(CursorLocation::BlockTop(next_block))
        } else {
            self.set_location(CursorLocation::NoWhere)
        }
    }

    fn insn(&self) -> Option<Insn> {
        if let CursorLocation::At(insn) = self.loc() {
            Some(insn)
        } else {
            None
        }
    }

    fn expect_insn(&self) -> Insn {
        self.insn()
            .expect("current cursor location doesn't point to insn")
    }

    fn block(&self, func: &Function) -> Option<Block> {
        match self.loc() {
            CursorLocation::At(insn) => Some(func.layout.insn_block(insn)),
            CursorLocation::BlockTop(block) | CursorLocation::BlockBottom(block) => Some(block),
            CursorLocation::NoWhere => None,
        }
    }

    fn expect_block(&self, func: &Function) -> Block {
        self.block(func).expect("cursor loc points to `NoWhere`")
    }

    fn append_block(&mut self, func: &mut Function, block: Block) {
        func.layout.append_block(block);
    }

    fn next_loc(&self, func: &Function) -> CursorLocation {
        match self.loc() {
            CursorLocation::At(insn) => func.layout.next_insn_of(insn).map_or_else(
                || CursorLocation::BlockBottom(func.layout.insn_block(insn)),
                CursorLocation::At,
            ),
            CursorLocation::BlockTop(block) => func
                .layout
                .first_insn_of(block)
                .map_or_else(|| CursorLocation::BlockBottom(block), CursorLocation::At),
            CursorLocation::BlockBottom(block) => func
                .layout
                .next_block_of(block)
                .map_or(CursorLocation::NoWhere, |next_block| {
                    CursorLocation::BlockTop(next_block)
                }),
            CursorLocation::NoWhere => CursorLocation::NoWhere,
        }
    }
}

#[derive(Debug)]
pub struct InsnInserter {
    loc: CursorLocation,
}

impl FuncCursor for InsnInserter {
    fn at_location(loc: CursorLocation) -> Self {
        Self { loc }
    }

    fn set_location(&mut self, loc: CursorLocation) {
        self.loc = loc;
    }

    fn loc(&self) -> CursorLocation {
        self.loc
    }
}
