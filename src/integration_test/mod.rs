//! End-to-end exercises of the cold-start flow: startup gate, state sync,
//! bootstrap majority, then DAG consensus.

#[cfg(test)]
mod cold_start_test;
