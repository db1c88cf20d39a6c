use crate::{InterpreterError, Variable};

/// The operand stack of one frame.
#[derive(Clone, Debug)]
pub struct DataStack<V> {
    items: Vec<Variable<V>>,
}

impl<V> Default for DataStack<V> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<V: Clone> DataStack<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: Variable<V>) {
        self.items.push(item);
    }

    fn underflow(&self, needed: usize) -> InterpreterError {
        InterpreterError::StackUnderflow {
            needed,
            depth: self.items.len(),
        }
    }

    pub fn pop(&mut self) -> Result<Variable<V>, InterpreterError> {
        self.items.pop().ok_or_else(|| self.underflow(1))
    }

    /// Pops the top `n` items, returned in push order.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Variable<V>>, InterpreterError> {
        if n > self.items.len() {
            return Err(self.underflow(n));
        }
        let at = self.items.len() - n;
        Ok(self.items.split_off(at))
    }

    /// The item `n` places from the top; `peek(1)` is the top.
    pub fn peek(&self, n: usize) -> Result<&Variable<V>, InterpreterError> {
        if n == 0 || n > self.items.len() {
            return Err(self.underflow(n.max(1)));
        }
        Ok(&self.items[self.items.len() - n])
    }

    pub fn top(&self) -> Result<&Variable<V>, InterpreterError> {
        self.peek(1)
    }

    pub fn set_top(&mut self, item: Variable<V>) -> Result<(), InterpreterError> {
        let Some(top) = self.items.len().checked_sub(1) else {
            return Err(self.underflow(1));
        };
        self.items[top] = item;
        Ok(())
    }

    /// Moves the top item down to position `n`, shifting the `n - 1` items
    /// beneath it up by one.
    pub fn rotate(&mut self, n: usize) -> Result<(), InterpreterError> {
        if n > self.items.len() {
            return Err(self.underflow(n));
        }
        let at = self.items.len() - n;
        self.items[at..].rotate_right(1);
        Ok(())
    }

    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    pub fn snapshot(&self) -> Vec<Variable<V>> {
        self.items.clone()
    }

    pub fn replace(&mut self, items: Vec<Variable<V>>) {
        self.items = items;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable<V>> + '_ {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(values: &[i32]) -> DataStack<i32> {
        let mut stack = DataStack::new();
        for &v in values {
            stack.push(Variable::from_value(v));
        }
        stack
    }

    fn values(stack: &DataStack<i32>) -> Vec<i32> {
        stack
            .iter()
            .map(|var| *var.get_atomic_value().unwrap())
            .collect()
    }

    #[test]
    fn rotate_three_moves_top_down() {
        let mut s = stack(&[1, 2, 3]);
        s.rotate(3).unwrap();
        assert_eq!(values(&s), [3, 1, 2]);
        s.rotate(2).unwrap();
        assert_eq!(values(&s), [3, 2, 1]);
    }

    #[test]
    fn pop_n_keeps_push_order() {
        let mut s = stack(&[1, 2, 3, 4]);
        let popped: Vec<i32> = s
            .pop_n(2)
            .unwrap()
            .iter()
            .map(|v| *v.get_atomic_value().unwrap())
            .collect();
        assert_eq!(popped, [3, 4]);
        assert_eq!(values(&s), [1, 2]);
    }

    #[test]
    fn underflow_is_reported() {
        let mut s = stack(&[1]);
        assert!(matches!(
            s.pop_n(2),
            Err(InterpreterError::StackUnderflow { needed: 2, depth: 1 })
        ));
        assert!(matches!(s.peek(2), Err(InterpreterError::StackUnderflow { .. })));
        s.pop().unwrap();
        assert!(s.pop().is_err());
        assert!(s.set_top(Variable::from_value(0)).is_err());
    }
}
