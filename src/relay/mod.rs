// Stream relay — subprocess lifecycle and the stdout→response forward pipe.

pub mod process;
pub mod stream;
