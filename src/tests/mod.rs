






#[cfg(test)]
pub mod orchestrator_tests;




#[cfg(test)]
pub mod wait_tests;

#[cfg(test)]
pub mod copy_tests;
